//! # verifynger-store
//!
//! Local SQLite storage for the attendance controller.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for users, attendance
//! logs and key/value settings.

pub mod attendance;
pub mod database;
pub mod migrations;
pub mod models;
pub mod settings;
pub mod users;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
pub use settings::BrokerSettings;
