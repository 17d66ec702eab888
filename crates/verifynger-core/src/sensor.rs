use std::time::Instant;

use tracing::info;

use verifynger_shared::protocol::{OutboundMessage, SensorCommand};
use verifynger_shared::Sensor;

use crate::controller::Controller;
use crate::error::Result;
use crate::events::ControllerEvent;
use crate::session::PendingSensor;

impl Controller {
    /// Switch to the next sensor in cycling order.
    pub fn cycle_sensor(&mut self) -> Result<Sensor> {
        let next = self.session.active_sensor.next();
        self.select_sensor(next)
    }

    /// Switch to `sensor`, applied optimistically until the node confirms.
    pub fn select_sensor(&mut self, sensor: Sensor) -> Result<Sensor> {
        self.require_connected()?;

        self.publish(OutboundMessage::Sensor(SensorCommand {
            sensor_id: sensor.index(),
        }))?;

        // Chained switches all revert to the last confirmed sensor.
        let previous = self
            .session
            .pending_sensor
            .map(|p| p.previous)
            .unwrap_or(self.session.active_sensor);

        self.session.active_sensor = sensor;
        self.session.pending_sensor = Some(PendingSensor {
            previous,
            requested: sensor,
            requested_at: Instant::now(),
        });

        info!(sensor = %sensor, index = sensor.index(), "Sensor switch requested");
        self.events.emit(ControllerEvent::SensorChanged {
            sensor,
            confirmed: false,
        });
        Ok(sensor)
    }

    /// The node named its active sensor. Emits only when something changed.
    pub(crate) fn on_sensor_confirmed(&mut self, sensor: Sensor) {
        let was_pending = self.session.pending_sensor.take().is_some();
        let changed = self.session.active_sensor != sensor;
        self.session.active_sensor = sensor;

        if changed || was_pending {
            info!(sensor = %sensor, "Sensor confirmed");
            self.events.emit(ControllerEvent::SensorChanged {
                sensor,
                confirmed: true,
            });
        }
    }
}
