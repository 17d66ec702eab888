use tracing::{debug, error, info, trace, warn};

use verifynger_shared::constants::DEFAULT_MATCH_SCORE;
use verifynger_shared::protocol::{
    OutboundMessage, VerifyRequest, VerifyResponse, VerifyResultKind, VerifyResultReport,
};
use verifynger_shared::{FingerprintHash, Sensor};

use crate::controller::Controller;
use crate::events::ControllerEvent;

impl Controller {
    /// Answer a `verify/request`: MATCH with the owner of the hash and a log
    /// row, or NO_MATCH.
    pub(crate) fn on_verify_request(&mut self, request: &VerifyRequest) {
        let Some(hash) = request
            .fingerprint_hash
            .as_deref()
            .and_then(FingerprintHash::new)
        else {
            warn!("Verification request without a fingerprint hash, dropped");
            return;
        };
        let score = request.match_score.unwrap_or(DEFAULT_MATCH_SCORE);
        let sensor = self.sensor_or_active(request.sensor.as_deref());
        let now = self.wall_clock();

        let owner = match self.db.find_user_by_hash(hash.as_str()) {
            Ok(owner) => owner,
            Err(e) => {
                // The node is waiting for an answer either way.
                error!(hash = %hash, error = %e, "User lookup failed, answering NO_MATCH");
                self.answer(VerifyResponse::no_match());
                return;
            }
        };

        match owner {
            Some(user) => {
                self.answer(VerifyResponse::matched(user.id_user, user.name.clone(), score));
                info!(user_id = user.id_user, name = %user.name, score, sensor = %sensor, "Attendance matched");

                match self
                    .db
                    .insert_attendance(user.id_user, &user.name, now, score, Some(hash.as_str()))
                {
                    Ok(entry) => self
                        .events
                        .emit(ControllerEvent::AttendanceRecorded { entry, sensor }),
                    Err(e) => error!(user_id = user.id_user, error = %e, "Failed to write attendance log"),
                }
                self.metrics.record_success(sensor, score, now);
            }
            None => {
                self.answer(VerifyResponse::no_match());
                info!(hash = %hash, sensor = %sensor, "Fingerprint not enrolled");
                self.metrics.record_failure(sensor, now);
                self.events.emit(ControllerEvent::VerificationFailed {
                    fingerprint_hash: hash.into_string(),
                    sensor,
                });
            }
        }

        self.emit_metrics();
    }

    /// Results seen on `verify/response`. Older firmware matches on the node
    /// and reports the user id here; newer firmware only echoes our answers.
    pub(crate) fn on_verify_result(&mut self, report: &VerifyResultReport) {
        match report.kind() {
            VerifyResultKind::Echo => {
                trace!(status = %report.status, "Own verification answer echoed");
            }
            VerifyResultKind::PeerMatch => self.on_peer_match(report),
            VerifyResultKind::PeerNoMatch => {
                let sensor = self.sensor_or_active(report.sensor.as_deref());
                let now = self.wall_clock();
                info!(sensor = %sensor, "Node rejected fingerprint");
                self.metrics.record_failure(sensor, now);
                self.emit_metrics();
            }
            VerifyResultKind::Other(status) => {
                debug!(status = %status, "Unhandled verification result");
            }
        }
    }

    fn on_peer_match(&mut self, report: &VerifyResultReport) {
        let Some(user_id) = report.user_id else {
            warn!("Node-side match without a user id, ignored");
            return;
        };
        let user = match self.db.find_user(user_id) {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!(user_id, "Node matched a user id that is not enrolled here");
                self.events
                    .warn(format!("User id {user_id} is not in the database"));
                return;
            }
            Err(e) => {
                error!(user_id, error = %e, "User lookup failed");
                return;
            }
        };

        // Older firmware may omit the sensor; the enrolled hash names it.
        let sensor = report
            .sensor
            .as_deref()
            .and_then(Sensor::from_name)
            .or_else(|| user.sensor())
            .unwrap_or(self.session.active_sensor);

        let now = self.wall_clock();
        match self
            .db
            .insert_attendance(user.id_user, &user.name, now, DEFAULT_MATCH_SCORE, None)
        {
            Ok(entry) => {
                info!(user_id, name = %user.name, sensor = %sensor, "Attendance matched on node");
                self.events
                    .emit(ControllerEvent::AttendanceRecorded { entry, sensor });
            }
            Err(e) => error!(user_id, error = %e, "Failed to write attendance log"),
        }
        self.metrics.record_success(sensor, DEFAULT_MATCH_SCORE, now);
        self.emit_metrics();
    }

    fn answer(&self, response: VerifyResponse) {
        if let Err(e) = self.publish(OutboundMessage::VerifyResponse(response)) {
            error!(error = %e, "Failed to publish verification answer");
        }
    }

    fn sensor_or_active(&self, name: Option<&str>) -> Sensor {
        name.and_then(Sensor::from_name)
            .unwrap_or(self.session.active_sensor)
    }
}
