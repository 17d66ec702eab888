//! Key/value settings. Only the last-used broker is stored today.

use chrono::NaiveDateTime;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use verifynger_shared::constants::{SETTING_MQTT_BROKER, SETTING_MQTT_PORT};

use crate::database::Database;
use crate::error::Result;
use crate::models::format_timestamp;

/// Broker endpoint remembered from the last successful connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
}

impl Database {
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Insert or overwrite.
    pub fn set_setting(&self, key: &str, value: &str, now: NaiveDateTime) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, format_timestamp(&now)],
        )?;
        Ok(())
    }

    /// `None` until both keys exist and the port parses.
    pub fn load_broker_settings(&self) -> Result<Option<BrokerSettings>> {
        let Some(host) = self.get_setting(SETTING_MQTT_BROKER)? else {
            return Ok(None);
        };
        let Some(port_raw) = self.get_setting(SETTING_MQTT_PORT)? else {
            return Ok(None);
        };

        match port_raw.trim().parse::<u16>() {
            Ok(port) => Ok(Some(BrokerSettings { host, port })),
            Err(_) => {
                tracing::warn!(value = %port_raw, "stored broker port is not a valid port, ignoring");
                Ok(None)
            }
        }
    }

    pub fn save_broker_settings(&self, broker: &BrokerSettings, now: NaiveDateTime) -> Result<()> {
        let tx = self.conn().unchecked_transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![SETTING_MQTT_BROKER, broker.host, format_timestamp(&now)],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![SETTING_MQTT_PORT, broker.port.to_string(), format_timestamp(&now)],
        )?;
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    #[test]
    fn missing_key_is_none() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.get_setting("nope").unwrap(), None);
        assert_eq!(db.load_broker_settings().unwrap(), None);
    }

    #[test]
    fn set_overwrites() {
        let db = Database::open_in_memory().unwrap();
        db.set_setting("k", "one", now()).unwrap();
        db.set_setting("k", "two", now()).unwrap();
        assert_eq!(db.get_setting("k").unwrap().as_deref(), Some("two"));
    }

    #[test]
    fn broker_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let broker = BrokerSettings {
            host: "broker.local".into(),
            port: 8883,
        };
        db.save_broker_settings(&broker, now()).unwrap();
        assert_eq!(db.load_broker_settings().unwrap(), Some(broker));
    }

    #[test]
    fn bad_port_is_ignored() {
        let db = Database::open_in_memory().unwrap();
        db.set_setting(SETTING_MQTT_BROKER, "broker.local", now()).unwrap();
        db.set_setting(SETTING_MQTT_PORT, "eighty", now()).unwrap();
        assert_eq!(db.load_broker_settings().unwrap(), None);
    }
}
