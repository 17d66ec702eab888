//! The controller task and the handle used to talk to it.
//!
//! Operator intents are queued as closures over `&mut Controller` and
//! answered through a oneshot, so they interleave with bus notifications
//! and timer ticks on the same single consumer.

use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use verifynger_net::BusNotification;
use verifynger_shared::{Mode, Sensor};
use verifynger_store::{AttendanceLogEntry, LogDateFilter, User};

use crate::controller::Controller;
use crate::enrollment::{EnrollmentForm, EnrollmentState};
use crate::error::{ControllerError, Result};
use crate::events::ControllerEvent;
use crate::metrics::SensorMetricView;
use crate::session::SessionStatus;

type Job = Box<dyn FnOnce(&mut Controller) + Send>;

/// Cloneable front door to the controller task.
#[derive(Clone)]
pub struct ControllerHandle {
    jobs: mpsc::Sender<Job>,
    events: crate::events::EventSink,
}

/// Spawn the controller task. It runs until every handle is dropped.
///
/// `tick` is how often pending waits are checked for expiry.
pub fn spawn_controller(
    controller: Controller,
    mut notif_rx: mpsc::Receiver<BusNotification>,
    tick: Duration,
) -> (ControllerHandle, JoinHandle<()>) {
    let (jobs_tx, mut jobs_rx) = mpsc::channel::<Job>(64);
    let handle = ControllerHandle {
        jobs: jobs_tx,
        events: controller.events().clone(),
    };

    let task = tokio::spawn(async move {
        let mut controller = controller;
        let mut bus_open = true;
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        controller.log_started();

        loop {
            tokio::select! {
                job = jobs_rx.recv() => match job {
                    Some(job) => job(&mut controller),
                    None => {
                        info!("All controller handles dropped, stopping");
                        break;
                    }
                },

                notification = notif_rx.recv(), if bus_open => match notification {
                    Some(n) => controller.handle_bus_notification(n),
                    None => {
                        warn!("Bus notification channel closed");
                        bus_open = false;
                        controller.handle_bus_notification(BusNotification::Disconnected {
                            reason: "bus task stopped".to_string(),
                        });
                    }
                },

                _ = ticker.tick() => controller.expire_stale(Instant::now()),
            }
        }

        controller.shutdown_bus();
    });

    (handle, task)
}

impl ControllerHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    /// Run `f` on the controller task and wait for its result.
    pub async fn call<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Controller) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |controller| {
            let _ = reply_tx.send(f(controller));
        });
        self.jobs
            .send(job)
            .await
            .map_err(|_| ControllerError::Stopped)?;
        reply_rx.await.map_err(|_| ControllerError::Stopped)
    }

    pub async fn connect(&self, broker: String, port: String) -> Result<()> {
        self.call(move |c| c.connect(&broker, &port)).await?
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.call(|c| c.disconnect()).await?
    }

    pub async fn request_mode_change(&self, mode: Mode) -> Result<bool> {
        self.call(move |c| c.request_mode_change(mode)).await?
    }

    pub async fn cycle_sensor(&self) -> Result<Sensor> {
        self.call(|c| c.cycle_sensor()).await?
    }

    pub async fn select_sensor(&self, sensor: Sensor) -> Result<Sensor> {
        self.call(move |c| c.select_sensor(sensor)).await?
    }

    pub async fn start_enrollment(&self, form: EnrollmentForm) -> Result<()> {
        self.call(move |c| c.start_enrollment(form)).await?
    }

    pub async fn commit_enrollment(
        &self,
        user_id: i64,
        name: String,
        email: Option<String>,
        position: Option<String>,
    ) -> Result<User> {
        self.call(move |c| {
            c.commit_enrollment(user_id, &name, email.as_deref(), position.as_deref())
        })
        .await?
    }

    pub async fn abandon_enrollment(&self) -> Result<()> {
        self.call(|c| c.abandon_enrollment()).await
    }

    /// What was typed at `start_enrollment`, while a scan is in flight.
    pub async fn enrollment_form(&self) -> Result<Option<EnrollmentForm>> {
        self.call(|c| c.enrollment().form().cloned()).await
    }

    pub async fn enrollment_state(&self) -> Result<(EnrollmentState, Option<String>)> {
        self.call(|c| {
            let e = c.enrollment();
            (e.state(), e.hash().map(|h| h.to_string()))
        })
        .await
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.call(|c| c.list_users()).await?
    }

    pub async fn lookup_user_id(&self, user_id: i64) -> Result<Option<User>> {
        self.call(move |c| c.lookup_user_id(user_id)).await?
    }

    pub async fn edit_user(
        &self,
        user_id: i64,
        name: String,
        email: Option<String>,
        position: Option<String>,
    ) -> Result<User> {
        self.call(move |c| c.edit_user(user_id, &name, email.as_deref(), position.as_deref()))
            .await?
    }

    pub async fn delete_user(&self, user_id: i64) -> Result<()> {
        self.call(move |c| c.delete_user(user_id)).await?
    }

    pub async fn recent_logs(&self, limit: u32) -> Result<Vec<AttendanceLogEntry>> {
        self.call(move |c| c.recent_logs(limit)).await?
    }

    pub async fn search_logs(&self, keyword: String, limit: u32) -> Result<Vec<AttendanceLogEntry>> {
        self.call(move |c| c.search_logs(&keyword, limit)).await?
    }

    pub async fn logs_by_date(
        &self,
        filter: LogDateFilter,
        limit: u32,
    ) -> Result<Vec<AttendanceLogEntry>> {
        self.call(move |c| c.logs_by_date(filter, limit)).await?
    }

    pub async fn clear_logs(&self) -> Result<usize> {
        self.call(|c| c.clear_logs()).await?
    }

    pub async fn unlock_door(&self, duration_ms: Option<u64>) -> Result<()> {
        self.call(move |c| c.unlock_door(duration_ms)).await?
    }

    pub async fn lock_door(&self) -> Result<()> {
        self.call(|c| c.lock_door()).await?
    }

    pub async fn metrics(&self) -> Result<Vec<SensorMetricView>> {
        self.call(|c| c.metrics_snapshot()).await
    }

    pub async fn status(&self) -> Result<SessionStatus> {
        self.call(|c| c.status()).await
    }
}
