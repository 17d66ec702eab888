use tracing::{debug, error, info, warn};

use verifynger_shared::protocol::{ModeCommand, OutboundMessage};
use verifynger_store::BrokerSettings;

use crate::controller::Controller;
use crate::error::{ControllerError, Result};
use crate::events::ControllerEvent;

impl Controller {
    /// Ask the bus to connect. The session only counts as connected once
    /// the broker acknowledges.
    pub fn connect(&mut self, broker: &str, port: &str) -> Result<()> {
        let host = broker.trim();
        if host.is_empty() {
            return Err(ControllerError::EmptyBroker);
        }
        let port: u16 = port
            .trim()
            .parse()
            .map_err(|_| ControllerError::InvalidPort(port.to_string()))?;

        verifynger_net::connect(&self.bus, host, port)?;

        info!(broker = %host, port, "Connect requested");
        self.session.broker = Some(BrokerSettings {
            host: host.to_string(),
            port,
        });
        Ok(())
    }

    /// Tear the session down. Mode and sensor keep their last confirmed
    /// values.
    pub fn disconnect(&mut self) -> Result<()> {
        verifynger_net::disconnect(&self.bus)?;

        let was_connected = self.session.connected;
        self.mark_disconnected();
        if was_connected {
            info!("Disconnected by operator");
            self.emit_connection(false, Some("closed by operator".to_string()));
        }
        Ok(())
    }

    pub(crate) fn on_connected(&mut self) {
        self.session.connected = true;

        if let Err(e) = verifynger_net::subscribe_inbound(&self.bus) {
            error!(error = %e, "Failed to subscribe inbound topics");
        }

        if let Some(broker) = self.session.broker.clone() {
            let now = self.wall_clock();
            if let Err(e) = self.db.save_broker_settings(&broker, now) {
                error!(error = %e, "Failed to save broker settings");
            }
            info!(broker = %broker.host, port = broker.port, "Connected to broker");
        }

        // The node may have restarted: tell it which mode we are in.
        let mode = self.session.mode;
        if let Err(e) = self.publish(OutboundMessage::Mode(ModeCommand { mode })) {
            error!(error = %e, "Failed to announce mode");
        }

        self.recount_used();
        self.emit_connection(true, None);
        self.emit_metrics();
    }

    pub(crate) fn on_connect_failed(&mut self, reason: String) {
        warn!(reason = %reason, "Broker connection failed");
        self.mark_disconnected();
        self.events.emit(ControllerEvent::ConnectionFailed { reason });
    }

    pub(crate) fn on_disconnected(&mut self, reason: String) {
        if !self.session.connected {
            debug!(reason = %reason, "Disconnect notice for a closed session");
            return;
        }
        warn!(reason = %reason, "Broker connection lost");
        self.mark_disconnected();
        self.emit_connection(false, Some(reason));
    }

    /// No confirmation can arrive any more: drop pending requests and fall
    /// back to the last sensor the node confirmed.
    fn mark_disconnected(&mut self) {
        self.session.connected = false;
        self.session.pending_mode = None;
        if let Some(pending) = self.session.pending_sensor.take() {
            self.session.active_sensor = pending.previous;
        }
    }

    fn emit_connection(&self, connected: bool, reason: Option<String>) {
        self.events.emit(ControllerEvent::ConnectionChanged {
            connected,
            broker: self.session.broker.as_ref().map(|b| b.host.clone()),
            port: self.session.broker.as_ref().map(|b| b.port),
            reason,
        });
    }
}
