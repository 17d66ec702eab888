//! Types shared by every VeriFynger crate: topic names, the sensor and mode
//! enumerations, and the JSON wire protocol spoken with the sensor node.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use types::{FingerprintHash, Mode, Sensor};
