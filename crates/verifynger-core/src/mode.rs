use std::time::Instant;

use tracing::{info, warn};

use verifynger_shared::protocol::{ModeCommand, OutboundMessage};
use verifynger_shared::Mode;

use crate::controller::Controller;
use crate::error::Result;
use crate::events::ControllerEvent;
use crate::session::PendingMode;

impl Controller {
    /// Ask the node to switch mode. Returns false when `target` is already
    /// the current mode and nothing was sent.
    ///
    /// The local mode does not change here; only the node's `mode_changed`
    /// status commits it.
    pub fn request_mode_change(&mut self, target: Mode) -> Result<bool> {
        if target == self.session.mode {
            return Ok(false);
        }
        self.require_connected()?;

        self.publish(OutboundMessage::Mode(ModeCommand { mode: target }))?;
        self.session.pending_mode = Some(PendingMode {
            target,
            requested_at: Instant::now(),
        });

        info!(from = %self.session.mode, to = %target, "Mode change requested");
        self.events.emit(ControllerEvent::ModeRequested { mode: target });
        Ok(true)
    }

    /// `mode_changed` from the node. The reported mode wins even if it is
    /// not the one we asked for.
    pub(crate) fn on_mode_confirmed(&mut self, reported: Option<&str>) {
        let Some(mode) = reported.and_then(|m| m.parse::<Mode>().ok()) else {
            warn!(reported = ?reported, "mode_changed without a known mode, ignored");
            return;
        };

        if let Some(pending) = self.session.pending_mode.take() {
            if pending.target != mode {
                warn!(requested = %pending.target, reported = %mode, "Node chose a different mode");
            }
        }

        let previous = self.session.mode;
        self.session.mode = mode;
        info!(mode = %mode, "Mode confirmed");

        match mode {
            Mode::Presensi => {
                if self.enrollment.state() != crate::enrollment::EnrollmentState::Idle {
                    info!("Leaving enrollment, pending enrollment abandoned");
                    self.enrollment.reset();
                    self.emit_enrollment();
                }
                self.events.emit(ControllerEvent::AttendanceDisplayCleared);
            }
            Mode::Daftar => {
                if previous != Mode::Daftar {
                    self.enrollment.reset();
                    self.emit_enrollment();
                }
            }
        }

        self.events.emit(ControllerEvent::ModeChanged { mode });
    }
}
