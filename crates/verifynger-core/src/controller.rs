//! The controller state owner.
//!
//! One task owns a [`Controller`] and feeds it inbound bus messages,
//! operator intents and timer ticks one at a time. The operations are split
//! across modules by concern (`connection`, `mode`, `sensor`, `enroll`,
//! `verification`, `admin`, `router`), each adding an `impl Controller`.

use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use verifynger_net::BusCommand;
use verifynger_shared::constants::{DEFAULT_CONFIRM_TIMEOUT_SECS, DEFAULT_ENROLL_TIMEOUT_SECS};
use verifynger_shared::protocol::OutboundMessage;
use verifynger_store::Database;

use crate::enrollment::Enrollment;
use crate::error::Result;
use crate::events::{ControllerEvent, EventSink};
use crate::metrics::{MetricsBoard, SensorMetricView};
use crate::session::{Session, SessionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreConfig {
    /// How long a scan may wait for its template result.
    pub enroll_timeout: Duration,
    /// How long mode and sensor requests wait for the node's confirmation.
    pub confirm_timeout: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            enroll_timeout: Duration::from_secs(DEFAULT_ENROLL_TIMEOUT_SECS),
            confirm_timeout: Duration::from_secs(DEFAULT_CONFIRM_TIMEOUT_SECS),
        }
    }
}

pub struct Controller {
    pub(crate) db: Database,
    pub(crate) bus: mpsc::Sender<BusCommand>,
    pub(crate) events: EventSink,
    pub(crate) config: CoreConfig,
    pub(crate) session: Session,
    pub(crate) enrollment: Enrollment,
    pub(crate) metrics: MetricsBoard,
}

impl Controller {
    pub fn new(
        db: Database,
        bus: mpsc::Sender<BusCommand>,
        events: EventSink,
        config: CoreConfig,
    ) -> Self {
        let mut controller = Self {
            db,
            bus,
            events,
            config,
            session: Session::default(),
            enrollment: Enrollment::new(),
            metrics: MetricsBoard::new(),
        };
        controller.recount_used();
        controller
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    pub fn enrollment(&self) -> &Enrollment {
        &self.enrollment
    }

    pub fn metrics_snapshot(&self) -> Vec<SensorMetricView> {
        self.metrics.snapshot()
    }

    pub(crate) fn require_connected(&self) -> Result<()> {
        if self.session.connected {
            Ok(())
        } else {
            Err(crate::error::ControllerError::NotConnected)
        }
    }

    pub(crate) fn publish(&self, message: OutboundMessage) -> Result<()> {
        verifynger_net::publish(&self.bus, &message)?;
        Ok(())
    }

    /// Controller wall clock, used for every persisted timestamp.
    pub(crate) fn wall_clock(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    /// Recount `used` for every sensor from the stored users. A store failure
    /// leaves the previous counts in place.
    pub(crate) fn recount_used(&mut self) {
        match self.db.list_fingerprint_hashes() {
            Ok(hashes) => self.metrics.recount_used(hashes.iter().map(String::as_str)),
            Err(e) => error!(error = %e, "Failed to recount enrolled templates"),
        }
    }

    pub(crate) fn emit_metrics(&self) {
        self.events.emit(ControllerEvent::MetricsUpdated {
            sensors: self.metrics.snapshot(),
        });
    }

    pub(crate) fn emit_enrollment(&self) {
        self.events.emit(ControllerEvent::EnrollmentChanged {
            state: self.enrollment.state(),
            fingerprint_hash: self.enrollment.hash().map(|h| h.to_string()),
        });
    }

    /// Expire every wait that has outlived its bound. Called on each tick.
    pub fn expire_stale(&mut self, now: Instant) {
        if self.enrollment.expire(now, self.config.enroll_timeout) {
            warn!(
                timeout_secs = self.config.enroll_timeout.as_secs(),
                "Enrollment scan timed out"
            );
            self.emit_enrollment();
            self.events.warn("Enrollment scan timed out, start it again");
        }

        if let Some(pending) = self.session.pending_mode {
            if now.saturating_duration_since(pending.requested_at) >= self.config.confirm_timeout {
                self.session.pending_mode = None;
                warn!(requested = %pending.target, current = %self.session.mode, "Mode change not confirmed");
                self.events.warn(format!(
                    "Node did not confirm mode {}, staying in {}",
                    pending.target, self.session.mode
                ));
            }
        }

        if let Some(pending) = self.session.pending_sensor {
            if now.saturating_duration_since(pending.requested_at) >= self.config.confirm_timeout {
                self.session.pending_sensor = None;
                self.session.active_sensor = pending.previous;
                warn!(
                    requested = %pending.requested,
                    reverted_to = %pending.previous,
                    "Sensor change not confirmed"
                );
                self.events.emit(ControllerEvent::SensorChanged {
                    sensor: pending.previous,
                    confirmed: false,
                });
                self.events.warn(format!(
                    "Node did not confirm sensor {}, back to {}",
                    pending.requested, pending.previous
                ));
            }
        }
    }

    /// Stop the bus task. Called once the controller task is done.
    pub(crate) fn shutdown_bus(&self) {
        if let Err(e) = verifynger_net::shutdown(&self.bus) {
            warn!(error = %e, "Bus already stopped");
        }
    }

    pub(crate) fn log_started(&self) {
        match (self.db.count_users(), self.db.count_logs()) {
            (Ok(users), Ok(logs)) => info!(
                mode = %self.session.mode,
                sensor = %self.session.active_sensor,
                users,
                logs,
                "Controller ready"
            ),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Controller ready, store counts unavailable")
            }
        }
    }
}
