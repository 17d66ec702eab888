//! v001 -- Initial schema creation.
//!
//! Creates the three tables the controller relies on: `users`,
//! `attendance_logs` and `settings`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id_user              INTEGER PRIMARY KEY,     -- operator-assigned, 1..=200
    name                 TEXT NOT NULL,
    email                TEXT,
    position             TEXT,
    fingerprint_template TEXT NOT NULL,           -- "{SENSOR}_{RAW_ID}"
    created_at           TEXT NOT NULL,           -- local "YYYY-MM-DD HH:MM:SS"
    updated_at           TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_users_template ON users(fingerprint_template);

-- ----------------------------------------------------------------
-- Attendance logs (append-only)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS attendance_logs (
    log_id           INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id          INTEGER NOT NULL,
    user_name        TEXT NOT NULL,               -- snapshot at write time
    check_in_time    TEXT NOT NULL,
    match_score      INTEGER,
    fingerprint_hash TEXT,

    FOREIGN KEY (user_id) REFERENCES users(id_user) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_attendance_user_id ON attendance_logs(user_id);
CREATE INDEX IF NOT EXISTS idx_attendance_time ON attendance_logs(check_in_time);

-- ----------------------------------------------------------------
-- Settings
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS settings (
    key        TEXT PRIMARY KEY NOT NULL,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
