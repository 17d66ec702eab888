//! # verifynger-core
//!
//! The attendance coordination protocol: mode switching, sensor selection,
//! two-phase enrollment, verification matching and per-sensor metrics,
//! driven by bus messages and operator intents on a single task.

pub mod bridge;
pub mod controller;
pub mod enrollment;
pub mod error;
pub mod events;
pub mod metrics;
pub mod session;

mod admin;
mod connection;
mod enroll;
mod mode;
mod router;
mod sensor;
mod verification;

pub use bridge::{spawn_controller, ControllerHandle};
pub use controller::{Controller, CoreConfig};
pub use enrollment::{EnrollmentForm, EnrollmentState};
pub use error::{ControllerError, Result};
pub use events::{ControllerEvent, EventSink};
pub use metrics::SensorMetricView;
pub use session::SessionStatus;
