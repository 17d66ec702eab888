//! Inbound dispatch: bus notifications in, controller operations out.

use tracing::{debug, info, warn};

use verifynger_net::BusNotification;
use verifynger_shared::protocol::{
    HealthReport, InboundMessage, PayloadEncoding, PeerError, StatusKind, StatusReport,
};
use verifynger_shared::Sensor;

use crate::controller::Controller;
use crate::events::ControllerEvent;

impl Controller {
    pub fn handle_bus_notification(&mut self, notification: BusNotification) {
        match notification {
            BusNotification::Connected => self.on_connected(),
            BusNotification::ConnectFailed { reason } => self.on_connect_failed(reason),
            BusNotification::Disconnected { reason } => self.on_disconnected(reason),
            BusNotification::MessageReceived { topic, payload } => {
                self.handle_message(&topic, &payload)
            }
        }
    }

    /// Decode and dispatch one bus message. Undecodable messages are logged
    /// and dropped.
    pub fn handle_message(&mut self, topic: &str, payload: &[u8]) {
        let decoded = match InboundMessage::decode(topic, payload) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(topic, error = %e, "Dropping undecodable message");
                return;
            }
        };
        if decoded.encoding == PayloadEncoding::Latin1 {
            debug!(topic, "Payload was not UTF-8, read as Latin-1");
        }

        let message = decoded.message;
        if !matches!(message, InboundMessage::Metrics(_) | InboundMessage::Health(_)) {
            debug!(topic, kind = message.kind(), "Inbound message");
        }

        match message {
            InboundMessage::Template(result) => self.on_template(&result),
            InboundMessage::Status(status) => self.on_status(&status),
            InboundMessage::PeerError(err) => self.on_peer_error(err),
            InboundMessage::VerifyRequest(request) => self.on_verify_request(&request),
            InboundMessage::VerifyResult(report) => self.on_verify_result(&report),
            InboundMessage::Health(report) => self.on_health(report),
            InboundMessage::Metrics(report) => {
                let now = self.wall_clock();
                self.metrics.apply_snapshot(&report, now);
                self.emit_metrics();
            }
        }
    }

    fn on_status(&mut self, status: &StatusReport) {
        match status.kind() {
            StatusKind::ModeChanged => self.on_mode_confirmed(status.mode.as_deref()),
            StatusKind::SensorChanged => {
                match status.sensor.as_deref().and_then(Sensor::from_name) {
                    Some(sensor) => self.on_sensor_confirmed(sensor),
                    None => warn!(sensor = ?status.sensor, "sensor_changed without a known sensor"),
                }
            }
            StatusKind::EnrollStarted => {
                info!(details = ?status.details, "Node started enrollment");
            }
            StatusKind::EnrollComplete => {
                info!(details = ?status.details, "Node finished enrollment");
                self.events.emit(ControllerEvent::UsersChanged);
            }
            StatusKind::Other(other) => {
                debug!(status = %other, details = ?status.details, "Unhandled status");
            }
        }
    }

    fn on_peer_error(&mut self, err: PeerError) {
        let name = err.code_name();
        let message = err.error_message.unwrap_or_default();
        warn!(code = ?err.error_code, name = ?name, message = %message, "Node reported an error");
        self.events.emit(ControllerEvent::PeerError {
            code: err.error_code,
            name,
            message,
        });
    }

    /// Health reports are authoritative for the active sensor. The mode they
    /// carry is only displayed.
    fn on_health(&mut self, report: HealthReport) {
        if let Some(sensor) = report.active_sensor() {
            self.on_sensor_confirmed(sensor);
        }
        if let Some(reported) = report.reported_mode() {
            if reported != self.session.mode {
                debug!(reported = %reported, current = %self.session.mode, "Health report disagrees on mode");
            }
        }

        let uptime = report.uptime_display();
        self.session.last_health = Some(report.clone());
        self.events.emit(ControllerEvent::Health { report, uptime });
    }
}
