//! Schema migrations, keyed on `PRAGMA user_version`.
//!
//! A fresh file (or an in-memory test database) starts at version 0 and is
//! walked through every step below. Each step and its version bump commit in
//! one transaction, so a crash mid-upgrade leaves the previous version intact.

pub mod v001_initial;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

type Step = fn(&Connection) -> rusqlite::Result<()>;

/// `(version reached, name, step)` in ascending order.
const STEPS: &[(u32, &str, Step)] = &[(1, "v001_initial", v001_initial::up)];

/// Schema version after every step has run.
pub const CURRENT_VERSION: u32 = 1;

pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database is at schema v{current}, this build knows v{CURRENT_VERSION}"
        )));
    }

    for &(version, name, step) in STEPS.iter().filter(|(v, _, _)| *v > current) {
        tracing::info!(from = current, to = version, name, "applying migration");

        let tx = conn.unchecked_transaction()?;
        step(&tx).map_err(|e| StoreError::Migration(format!("{name}: {e}")))?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
    }

    Ok(())
}
