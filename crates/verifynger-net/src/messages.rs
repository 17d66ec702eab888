use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

use verifynger_shared::constants::INBOUND_TOPICS;
use verifynger_shared::protocol::OutboundMessage;

use crate::bus::BusCommand;
use crate::error::BusError;

/// Encode `message` and queue it for publication on its topic.
///
/// Never blocks: a full queue is reported rather than waited on, so callers
/// holding state can stay synchronous.
pub fn publish(cmd_tx: &mpsc::Sender<BusCommand>, message: &OutboundMessage) -> Result<(), BusError> {
    let topic = message.topic().to_string();
    let payload = message.to_payload()?;

    debug!(topic = %topic, len = payload.len(), "Queueing publish");

    enqueue(cmd_tx, BusCommand::Publish { topic, payload })
}

/// Queue subscriptions for every topic the controller consumes.
pub fn subscribe_inbound(cmd_tx: &mpsc::Sender<BusCommand>) -> Result<(), BusError> {
    for topic in INBOUND_TOPICS {
        enqueue(cmd_tx, BusCommand::Subscribe(topic.to_string()))?;
    }
    Ok(())
}

/// Ask the bus task to open a session to `broker:port`.
pub fn connect(cmd_tx: &mpsc::Sender<BusCommand>, broker: &str, port: u16) -> Result<(), BusError> {
    enqueue(
        cmd_tx,
        BusCommand::Connect {
            broker: broker.to_string(),
            port,
        },
    )
}

pub fn disconnect(cmd_tx: &mpsc::Sender<BusCommand>) -> Result<(), BusError> {
    enqueue(cmd_tx, BusCommand::Disconnect)
}

pub fn shutdown(cmd_tx: &mpsc::Sender<BusCommand>) -> Result<(), BusError> {
    enqueue(cmd_tx, BusCommand::Shutdown)
}

fn enqueue(cmd_tx: &mpsc::Sender<BusCommand>, cmd: BusCommand) -> Result<(), BusError> {
    cmd_tx.try_send(cmd).map_err(|e| match e {
        TrySendError::Full(_) => BusError::ChannelFull,
        TrySendError::Closed(_) => BusError::ChannelClosed,
    })
}
