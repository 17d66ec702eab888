//! Domain model structs persisted in the local database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the presentation layer.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use verifynger_shared::types::{sensor_of_hash, Sensor};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// An enrolled person.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Operator-assigned id, unique, within `USER_ID_MIN..=USER_ID_MAX`.
    pub id_user: i64,
    pub name: String,
    pub email: Option<String>,
    pub position: Option<String>,
    /// `"{SENSOR}_{RAW_ID}"` as reported by the node at enrollment.
    pub fingerprint_hash: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl User {
    /// Sensor holding this user's template, when the hash names a known one.
    pub fn sensor(&self) -> Option<Sensor> {
        sensor_of_hash(&self.fingerprint_hash)
    }
}

/// Fields an operator may change after enrollment. The hash is fixed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserUpdate {
    pub name: String,
    pub email: Option<String>,
    pub position: Option<String>,
}

// ---------------------------------------------------------------------------
// Attendance log
// ---------------------------------------------------------------------------

/// One successful check-in. Never updated once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttendanceLogEntry {
    pub log_id: i64,
    pub user_id: i64,
    /// Name at the time of the check-in.
    pub user_name: String,
    /// Controller wall clock, not the node's.
    pub check_in_time: NaiveDateTime,
    pub match_score: Option<i64>,
    pub fingerprint_hash: Option<String>,
}

/// Calendar filter for log listings; `None` components match everything.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogDateFilter {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl LogDateFilter {
    pub fn is_empty(&self) -> bool {
        self.year.is_none() && self.month.is_none() && self.day.is_none()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(verifynger_shared::constants::TIMESTAMP_FORMAT)
        .to_string()
}

/// Parse a stored timestamp, reporting failures against column `idx`.
pub(crate) fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, verifynger_shared::constants::TIMESTAMP_FORMAT).map_err(
        |e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)),
    )
}
