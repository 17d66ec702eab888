//! User administration, attendance log queries and the door relay.

use tracing::{error, info};

use verifynger_shared::constants::RELAY_DEFAULT_DURATION_MS;
use verifynger_shared::protocol::{OutboundMessage, RelayAction, RelayCommand};
use verifynger_store::{AttendanceLogEntry, LogDateFilter, User, UserUpdate};

use crate::controller::Controller;
use crate::error::{ControllerError, Result};
use crate::events::ControllerEvent;

impl Controller {
    pub fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.db.list_users()?)
    }

    /// Advisory check while the operator types an id. Commit still enforces
    /// uniqueness on its own.
    pub fn lookup_user_id(&self, user_id: i64) -> Result<Option<User>> {
        Ok(self.db.find_user(user_id)?)
    }

    pub fn edit_user(
        &mut self,
        user_id: i64,
        name: &str,
        email: Option<&str>,
        position: Option<&str>,
    ) -> Result<User> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ControllerError::EmptyName);
        }
        let update = UserUpdate {
            name: name.to_string(),
            email: email.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string),
            position: position.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string),
        };

        let now = self.wall_clock();
        if !self.db.update_user(user_id, &update, now)? {
            return Err(ControllerError::UserNotFound(user_id));
        }

        info!(user_id, name = %update.name, "User updated");
        self.events.emit(ControllerEvent::UsersChanged);
        Ok(self.db.get_user(user_id)?)
    }

    /// Delete a user and, through the schema, all of their log rows.
    pub fn delete_user(&mut self, user_id: i64) -> Result<()> {
        if !self.db.delete_user(user_id)? {
            return Err(ControllerError::UserNotFound(user_id));
        }

        info!(user_id, "User deleted");
        self.recount_used();
        self.events.emit(ControllerEvent::UsersChanged);
        self.emit_metrics();
        Ok(())
    }

    pub fn recent_logs(&self, limit: u32) -> Result<Vec<AttendanceLogEntry>> {
        Ok(self.db.recent_logs(limit)?)
    }

    pub fn search_logs(&self, keyword: &str, limit: u32) -> Result<Vec<AttendanceLogEntry>> {
        Ok(self.db.search_logs(keyword, limit)?)
    }

    pub fn logs_by_date(
        &self,
        filter: LogDateFilter,
        limit: u32,
    ) -> Result<Vec<AttendanceLogEntry>> {
        Ok(self.db.logs_by_date(&filter, limit)?)
    }

    pub fn clear_logs(&mut self) -> Result<usize> {
        let removed = self.db.clear_logs().map_err(|e| {
            error!(error = %e, "Failed to clear attendance logs");
            e
        })?;
        info!(removed, "Attendance logs cleared");
        Ok(removed)
    }

    /// Open the door relay for `duration_ms`, or the default hold time.
    pub fn unlock_door(&mut self, duration_ms: Option<u64>) -> Result<()> {
        self.require_connected()?;
        let duration_ms = duration_ms.unwrap_or(RELAY_DEFAULT_DURATION_MS);

        self.publish(OutboundMessage::Relay(RelayCommand {
            action: RelayAction::Unlock,
            duration_ms: Some(duration_ms),
        }))?;

        info!(duration_ms, "Door unlock requested");
        Ok(())
    }

    /// Close the door relay immediately.
    pub fn lock_door(&mut self) -> Result<()> {
        self.require_connected()?;
        self.publish(OutboundMessage::Relay(RelayCommand {
            action: RelayAction::Lock,
            duration_ms: None,
        }))?;

        info!("Door lock requested");
        Ok(())
    }
}
