//! Notifications for the presentation layer.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use verifynger_shared::protocol::HealthReport;
use verifynger_shared::{Mode, Sensor};
use verifynger_store::{AttendanceLogEntry, User};

use crate::enrollment::EnrollmentState;
use crate::metrics::SensorMetricView;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControllerEvent {
    ConnectionChanged {
        connected: bool,
        broker: Option<String>,
        port: Option<u16>,
        reason: Option<String>,
    },
    ConnectionFailed {
        reason: String,
    },
    /// Sent to the node, not yet confirmed.
    ModeRequested {
        mode: Mode,
    },
    ModeChanged {
        mode: Mode,
    },
    SensorChanged {
        sensor: Sensor,
        confirmed: bool,
    },
    EnrollmentChanged {
        state: EnrollmentState,
        fingerprint_hash: Option<String>,
    },
    UserSaved {
        user: User,
    },
    UsersChanged,
    AttendanceRecorded {
        entry: AttendanceLogEntry,
        sensor: Sensor,
    },
    VerificationFailed {
        fingerprint_hash: String,
        sensor: Sensor,
    },
    AttendanceDisplayCleared,
    MetricsUpdated {
        sensors: Vec<SensorMetricView>,
    },
    Health {
        report: HealthReport,
        uptime: String,
    },
    PeerError {
        code: Option<i64>,
        name: Option<&'static str>,
        message: String,
    },
    Warning {
        message: String,
    },
}

/// Fan-out handle. Emitting with nobody listening is not an error.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<ControllerEvent>,
}

impl EventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ControllerEvent) {
        if let Err(e) = self.tx.send(event) {
            trace!(event = ?e.0, "No event listeners");
        }
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(ControllerEvent::Warning {
            message: message.into(),
        });
    }
}
