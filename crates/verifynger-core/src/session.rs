//! Connection, mode and sensor state, plus the requests awaiting the node's
//! confirmation.

use std::time::Instant;

use verifynger_shared::protocol::HealthReport;
use verifynger_shared::{Mode, Sensor};
use verifynger_store::BrokerSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingMode {
    pub target: Mode,
    pub requested_at: Instant,
}

/// An optimistic sensor switch. `previous` is restored if the node never
/// confirms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSensor {
    pub previous: Sensor,
    pub requested: Sensor,
    pub requested_at: Instant,
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    pub connected: bool,
    /// Last broker asked for; saved to the store once the broker accepts.
    pub broker: Option<BrokerSettings>,
    pub mode: Mode,
    pub pending_mode: Option<PendingMode>,
    pub active_sensor: Sensor,
    pub pending_sensor: Option<PendingSensor>,
    /// Most recent health report, for display only.
    pub last_health: Option<HealthReport>,
}

/// Read-only copy for status queries.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SessionStatus {
    pub connected: bool,
    pub broker: Option<String>,
    pub port: Option<u16>,
    pub mode: Mode,
    pub pending_mode: Option<Mode>,
    pub active_sensor: Sensor,
    pub sensor_confirmed: bool,
    /// Mode the node last claimed in a health report.
    pub reported_mode: Option<Mode>,
}

impl Session {
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            connected: self.connected,
            broker: self.broker.as_ref().map(|b| b.host.clone()),
            port: self.broker.as_ref().map(|b| b.port),
            mode: self.mode,
            pending_mode: self.pending_mode.map(|p| p.target),
            active_sensor: self.active_sensor,
            sensor_confirmed: self.pending_sensor.is_none(),
            reported_mode: self.last_health.as_ref().and_then(|h| h.reported_mode()),
        }
    }
}
