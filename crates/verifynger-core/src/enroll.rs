use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use verifynger_shared::constants::{USER_ID_MAX, USER_ID_MIN};
use verifynger_shared::protocol::{EnrollCommand, OutboundMessage, TemplateResult};
use verifynger_shared::{FingerprintHash, Sensor};
use verifynger_store::User;

use crate::controller::Controller;
use crate::enrollment::{EnrollmentForm, EnrollmentState};
use crate::error::{ControllerError, Result};
use crate::events::ControllerEvent;

impl Controller {
    /// Ask the node to scan a new finger for the person described in `form`.
    pub fn start_enrollment(&mut self, form: EnrollmentForm) -> Result<()> {
        self.require_connected()?;

        let form = normalize_form(form);
        if form.name.is_empty() {
            return Err(ControllerError::EmptyName);
        }
        if !self.enrollment.can_start() {
            return Err(ControllerError::EnrollmentBusy(self.enrollment.state()));
        }

        let command = EnrollCommand::start(
            form.name.clone(),
            form.email.as_deref(),
            form.position.as_deref(),
            Utc::now().timestamp(),
        );
        self.publish(OutboundMessage::Enroll(command))?;

        info!(name = %form.name, "Enrollment scan started");
        self.enrollment.begin_scan(form, Instant::now());
        self.emit_enrollment();
        Ok(())
    }

    pub(crate) fn on_template(&mut self, result: &TemplateResult) {
        let hash = result
            .fingerprint_hash
            .as_deref()
            .and_then(FingerprintHash::new);
        let sensor = result
            .sensor
            .as_deref()
            .and_then(Sensor::from_name)
            .or_else(|| hash.as_ref().and_then(FingerprintHash::sensor))
            .unwrap_or(self.session.active_sensor);

        let now = self.wall_clock();
        self.metrics.record_scan(sensor, hash.is_some(), now);
        self.emit_metrics();

        if self.enrollment.state() == EnrollmentState::Idle {
            debug!(hash = ?hash, "Template result with no enrollment in progress, ignored");
            return;
        }

        match &hash {
            Some(h) => info!(hash = %h, sensor = %sensor, raw_id = ?result.fingerprint_id, "Template received"),
            None => warn!(sensor = %sensor, "Enrollment scan failed"),
        }
        let failed = hash.is_none();
        self.enrollment.accept_template(hash);
        self.emit_enrollment();
        if failed {
            self.events.warn("Enrollment scan failed, try again");
        }
    }

    /// Persist the scanned finger under `user_id`. Nothing is published.
    pub fn commit_enrollment(
        &mut self,
        user_id: i64,
        name: &str,
        email: Option<&str>,
        position: Option<&str>,
    ) -> Result<User> {
        let Some(hash) = self.enrollment.hash().cloned().filter(|_| self.enrollment.can_commit())
        else {
            return Err(ControllerError::NoPendingHash);
        };

        if !(USER_ID_MIN..=USER_ID_MAX).contains(&user_id) {
            return Err(ControllerError::UserIdOutOfRange(user_id));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(ControllerError::EmptyName);
        }

        if let Some(owner) = self.db.find_user(user_id)? {
            return Err(ControllerError::DuplicateUserId {
                id: user_id,
                owner: owner.name,
            });
        }
        if let Some(owner) = self.db.find_user_by_hash(hash.as_str())? {
            return Err(ControllerError::DuplicateFingerprint {
                hash: hash.into_string(),
                owner_id: owner.id_user,
                owner: owner.name,
            });
        }

        let now = self.wall_clock();
        let user = User {
            id_user: user_id,
            name: name.to_string(),
            email: non_blank(email),
            position: non_blank(position),
            fingerprint_hash: hash.into_string(),
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.db.insert_user(&user) {
            error!(user_id, error = %e, "Failed to save enrolled user");
            return Err(e.into());
        }

        self.enrollment.take_committed();
        self.recount_used();

        info!(user_id, name = %user.name, hash = %user.fingerprint_hash, "User enrolled");
        self.events.emit(ControllerEvent::UserSaved { user: user.clone() });
        self.events.emit(ControllerEvent::UsersChanged);
        self.emit_enrollment();
        self.emit_metrics();
        Ok(user)
    }

    /// Drop the in-flight enrollment, whatever its state.
    pub fn abandon_enrollment(&mut self) {
        if self.enrollment.state() == EnrollmentState::Idle {
            return;
        }
        info!(state = ?self.enrollment.state(), "Enrollment abandoned");
        self.enrollment.reset();
        self.emit_enrollment();
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn normalize_form(form: EnrollmentForm) -> EnrollmentForm {
    EnrollmentForm {
        name: form.name.trim().to_string(),
        email: non_blank(form.email.as_deref()),
        position: non_blank(form.position.as_deref()),
    }
}
