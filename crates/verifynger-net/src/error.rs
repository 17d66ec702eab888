use thiserror::Error;

use verifynger_shared::ProtocolError;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus task is not running")]
    ChannelClosed,

    #[error("bus command queue is full")]
    ChannelFull,

    #[error("encode error: {0}")]
    Encode(#[from] ProtocolError),
}
