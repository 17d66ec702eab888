// MQTT bus plumbing: one background task owns the client, the rest of the
// application talks to it through command and notification channels.

pub mod bus;
pub mod error;
pub mod messages;

pub use bus::{spawn_bus, BusCommand, BusConfig, BusNotification};
pub use error::BusError;
pub use messages::{connect, disconnect, publish, shutdown, subscribe_inbound};
