use thiserror::Error;

use verifynger_net::BusError;
use verifynger_store::StoreError;

use crate::enrollment::EnrollmentState;

/// Everything an operator intent can be rejected with. Domain errors are
/// raised before anything is published or written.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("not connected to the broker")]
    NotConnected,

    #[error("invalid port: {0:?}")]
    InvalidPort(String),

    #[error("broker address is empty")]
    EmptyBroker,

    #[error("name must not be empty")]
    EmptyName,

    #[error("user id {0} is outside 1..=200")]
    UserIdOutOfRange(i64),

    #[error("user id {id} already belongs to {owner}")]
    DuplicateUserId { id: i64, owner: String },

    #[error("fingerprint {hash} is already enrolled for {owner} (id {owner_id})")]
    DuplicateFingerprint {
        hash: String,
        owner_id: i64,
        owner: String,
    },

    #[error("no fingerprint hash is pending")]
    NoPendingHash,

    #[error("an enrollment is already in progress ({0:?})")]
    EnrollmentBusy(EnrollmentState),

    #[error("user {0} not found")]
    UserNotFound(i64),

    #[error("controller task has stopped")]
    Stopped,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("bus error: {0}")]
    Bus(#[from] BusError),
}

pub type Result<T> = std::result::Result<T, ControllerError>;
