//! Controller configuration loaded from environment variables.
//!
//! Every setting has a default so the controller starts with zero
//! configuration. Broker settings saved by an earlier session take the place
//! of the built-in defaults, but an explicit environment value wins over both.

use std::path::PathBuf;
use std::time::Duration;

use verifynger_shared::constants::{
    DEFAULT_CONFIRM_TIMEOUT_SECS, DEFAULT_ENROLL_TIMEOUT_SECS, DEFAULT_MQTT_BROKER,
    DEFAULT_MQTT_PORT,
};
use verifynger_store::BrokerSettings;

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// SQLite file. `None` uses the platform data directory.
    /// Env: `VERIFYNGER_DB_PATH`
    pub db_path: Option<PathBuf>,

    /// Env: `MQTT_BROKER`
    pub mqtt_broker: Option<String>,

    /// Env: `MQTT_PORT`
    pub mqtt_port: Option<u16>,

    /// Fixed MQTT client id; random when unset.
    /// Env: `MQTT_CLIENT_ID`
    pub client_id: Option<String>,

    /// Env: `ENROLL_TIMEOUT_SECS`, default 60
    pub enroll_timeout: Duration,

    /// Wait for mode and sensor confirmations.
    /// Env: `CONFIRM_TIMEOUT_SECS`, default 10
    pub confirm_timeout: Duration,

    /// Connect to the resolved broker at startup.
    /// Env: `AUTO_CONNECT` (true/false), default false
    pub auto_connect: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            mqtt_broker: None,
            mqtt_port: None,
            client_id: None,
            enroll_timeout: Duration::from_secs(DEFAULT_ENROLL_TIMEOUT_SECS),
            confirm_timeout: Duration::from_secs(DEFAULT_CONFIRM_TIMEOUT_SECS),
            auto_connect: false,
        }
    }
}

impl ControllerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("VERIFYNGER_DB_PATH").filter(|p| !p.trim().is_empty()) {
            config.db_path = Some(PathBuf::from(path));
        }

        if let Some(broker) = lookup("MQTT_BROKER").filter(|b| !b.trim().is_empty()) {
            config.mqtt_broker = Some(broker.trim().to_string());
        }

        if let Some(val) = lookup("MQTT_PORT") {
            match val.trim().parse::<u16>() {
                Ok(port) => config.mqtt_port = Some(port),
                Err(_) => tracing::warn!(value = %val, "Invalid MQTT_PORT, ignoring"),
            }
        }

        if let Some(id) = lookup("MQTT_CLIENT_ID").filter(|id| !id.trim().is_empty()) {
            config.client_id = Some(id);
        }

        if let Some(secs) = parse_secs(&lookup, "ENROLL_TIMEOUT_SECS") {
            config.enroll_timeout = secs;
        }

        if let Some(secs) = parse_secs(&lookup, "CONFIRM_TIMEOUT_SECS") {
            config.confirm_timeout = secs;
        }

        if let Some(val) = lookup("AUTO_CONNECT") {
            config.auto_connect = val == "true" || val == "1";
        }

        config
    }

    /// Environment first, then what the store remembers, then the defaults.
    pub fn resolve_broker(&self, saved: Option<&BrokerSettings>) -> BrokerSettings {
        let host = self
            .mqtt_broker
            .clone()
            .or_else(|| saved.map(|s| s.host.clone()))
            .unwrap_or_else(|| DEFAULT_MQTT_BROKER.to_string());
        let port = self
            .mqtt_port
            .or_else(|| saved.map(|s| s.port))
            .unwrap_or(DEFAULT_MQTT_PORT);
        BrokerSettings { host, port }
    }
}

fn parse_secs(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let val = lookup(key)?;
    match val.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
        _ => {
            tracing::warn!(key, value = %val, "Invalid timeout, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> ControllerConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ControllerConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = from_pairs(&[]);
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.enroll_timeout, Duration::from_secs(60));
        assert!(!config.auto_connect);
    }

    #[test]
    fn test_env_values() {
        let config = from_pairs(&[
            ("VERIFYNGER_DB_PATH", "/tmp/a.db"),
            ("MQTT_BROKER", " broker.local "),
            ("MQTT_PORT", "8883"),
            ("CONFIRM_TIMEOUT_SECS", "3"),
            ("AUTO_CONNECT", "1"),
        ]);
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/a.db")));
        assert_eq!(config.mqtt_broker.as_deref(), Some("broker.local"));
        assert_eq!(config.mqtt_port, Some(8883));
        assert_eq!(config.confirm_timeout, Duration::from_secs(3));
        assert!(config.auto_connect);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_pairs(&[
            ("MQTT_PORT", "99999"),
            ("ENROLL_TIMEOUT_SECS", "0"),
            ("CONFIRM_TIMEOUT_SECS", "soon"),
        ]);
        assert_eq!(config.mqtt_port, None);
        assert_eq!(config.enroll_timeout, Duration::from_secs(60));
        assert_eq!(config.confirm_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_broker_precedence() {
        let saved = BrokerSettings {
            host: "saved.local".into(),
            port: 1884,
        };

        let none = from_pairs(&[]);
        assert_eq!(none.resolve_broker(None).host, DEFAULT_MQTT_BROKER);
        assert_eq!(none.resolve_broker(Some(&saved)), saved);

        let env = from_pairs(&[("MQTT_BROKER", "env.local")]);
        let resolved = env.resolve_broker(Some(&saved));
        assert_eq!(resolved.host, "env.local");
        assert_eq!(resolved.port, 1884);
    }
}
