//! MQTT client orchestration with the tokio mpsc command/notification pattern.
//!
//! A single task owns the `rumqttc` client. Each connection gets its own
//! poller task driving the event loop; it reports connection state changes
//! and received publishes back through the notification channel. A lost or
//! refused connection ends the poller: reconnecting is the caller's call.

use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use verifynger_shared::constants::{APP_NAME, MQTT_KEEP_ALIVE_SECS};

// ---------------------------------------------------------------------------
// Command / notification types
// ---------------------------------------------------------------------------

/// Commands sent *into* the bus task.
#[derive(Debug)]
pub enum BusCommand {
    /// Open a session to `broker:port`, replacing any current one.
    Connect { broker: String, port: u16 },
    Subscribe(String),
    Publish { topic: String, payload: Vec<u8> },
    /// Close the current session, if any.
    Disconnect,
    Shutdown,
}

/// Notifications sent *from* the bus task.
#[derive(Debug, Clone, PartialEq)]
pub enum BusNotification {
    /// The broker accepted the session.
    Connected,
    /// The session never came up.
    ConnectFailed { reason: String },
    /// An established session ended, on request or not.
    Disconnected { reason: String },
    MessageReceived { topic: String, payload: Vec<u8> },
}

pub struct BusConfig {
    /// Fixed client id; a random one is generated when `None`.
    pub client_id: Option<String>,
    pub keep_alive: Duration,
    /// Capacity of both the command and the notification queues.
    pub channel_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            keep_alive: Duration::from_secs(MQTT_KEEP_ALIVE_SECS),
            channel_capacity: 256,
        }
    }
}

struct Session {
    client: AsyncClient,
    poller: JoinHandle<()>,
}

/// Spawn the bus task. Must be called from within a tokio runtime.
///
/// Returns `(command_tx, notification_rx)`.
pub fn spawn_bus(
    config: BusConfig,
) -> (mpsc::Sender<BusCommand>, mpsc::Receiver<BusNotification>) {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<BusCommand>(config.channel_capacity);
    let (notif_tx, notif_rx) = mpsc::channel::<BusNotification>(config.channel_capacity);

    let client_id = config
        .client_id
        .clone()
        .unwrap_or_else(generate_client_id);

    tokio::spawn(async move {
        let mut session: Option<Session> = None;

        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                BusCommand::Connect { broker, port } => {
                    if let Some(old) = session.take() {
                        close_session(old, &notif_tx).await;
                    }

                    info!(broker = %broker, port, client_id = %client_id, "Connecting to broker");

                    let mut options = MqttOptions::new(client_id.clone(), broker, port);
                    options.set_keep_alive(config.keep_alive);
                    options.set_clean_session(true);

                    let (client, eventloop) = AsyncClient::new(options, config.channel_capacity);
                    let poller = tokio::spawn(poll_connection(eventloop, notif_tx.clone()));
                    session = Some(Session { client, poller });
                }
                BusCommand::Subscribe(topic) => match session.as_ref() {
                    Some(s) => {
                        if let Err(e) = s.client.subscribe(topic.clone(), QoS::AtMostOnce).await {
                            error!(topic = %topic, error = %e, "Subscribe failed");
                        } else {
                            debug!(topic = %topic, "Subscribed");
                        }
                    }
                    None => warn!(topic = %topic, "Subscribe without a session, dropped"),
                },
                BusCommand::Publish { topic, payload } => match session.as_ref() {
                    Some(s) => {
                        if let Err(e) = s
                            .client
                            .publish(topic.clone(), QoS::AtMostOnce, false, payload)
                            .await
                        {
                            error!(topic = %topic, error = %e, "Publish failed");
                        }
                    }
                    None => warn!(topic = %topic, "Publish without a session, dropped"),
                },
                BusCommand::Disconnect => match session.take() {
                    Some(s) => close_session(s, &notif_tx).await,
                    None => debug!("Disconnect without a session"),
                },
                BusCommand::Shutdown => {
                    info!("Bus shutdown requested");
                    break;
                }
            }
        }

        if let Some(s) = session.take() {
            close_session(s, &notif_tx).await;
        }
        info!("Bus task stopped");
    });

    (cmd_tx, notif_rx)
}

fn generate_client_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", APP_NAME.to_ascii_lowercase(), &suffix[..8])
}

/// Ask the broker to close the session, giving the poller a moment to flush
/// the DISCONNECT before it is torn down.
async fn close_session(session: Session, notif_tx: &mpsc::Sender<BusNotification>) {
    let Session { client, poller } = session;
    let abort = poller.abort_handle();

    if let Err(e) = client.try_disconnect() {
        debug!(error = %e, "Disconnect request not queued");
    }

    if tokio::time::timeout(Duration::from_secs(1), poller)
        .await
        .is_err()
    {
        abort.abort();
        let _ = notif_tx
            .send(BusNotification::Disconnected {
                reason: "closed by controller".to_string(),
            })
            .await;
    }
}

// ---------------------------------------------------------------------------
// Per-connection poller
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
enum PollStep {
    Accepted,
    Refused(String),
    Message { topic: String, payload: Vec<u8> },
    ClosedLocally,
    Ignore,
}

fn classify(event: Event) -> PollStep {
    match event {
        Event::Incoming(Packet::ConnAck(ack)) => {
            if ack.code == ConnectReturnCode::Success {
                PollStep::Accepted
            } else {
                PollStep::Refused(format!("{:?}", ack.code))
            }
        }
        Event::Incoming(Packet::Publish(publish)) => PollStep::Message {
            topic: publish.topic,
            payload: publish.payload.to_vec(),
        },
        Event::Outgoing(Outgoing::Disconnect) => PollStep::ClosedLocally,
        _ => PollStep::Ignore,
    }
}

async fn poll_connection(mut eventloop: EventLoop, notif_tx: mpsc::Sender<BusNotification>) {
    let mut connected = false;

    loop {
        let event = match eventloop.poll().await {
            Ok(event) => event,
            Err(e) => {
                let reason = describe_error(&e);
                let notification = if connected {
                    warn!(reason = %reason, "Broker connection lost");
                    BusNotification::Disconnected { reason }
                } else {
                    warn!(reason = %reason, "Broker connection failed");
                    BusNotification::ConnectFailed { reason }
                };
                let _ = notif_tx.send(notification).await;
                break;
            }
        };

        match classify(event) {
            PollStep::Accepted => {
                connected = true;
                info!("Broker accepted connection");
                let _ = notif_tx.send(BusNotification::Connected).await;
            }
            PollStep::Refused(reason) => {
                warn!(reason = %reason, "Broker refused connection");
                let _ = notif_tx.send(BusNotification::ConnectFailed { reason }).await;
                break;
            }
            PollStep::Message { topic, payload } => {
                debug!(topic = %topic, len = payload.len(), "Message received");
                let _ = notif_tx
                    .send(BusNotification::MessageReceived { topic, payload })
                    .await;
            }
            PollStep::ClosedLocally => {
                info!("Disconnected from broker");
                let _ = notif_tx
                    .send(BusNotification::Disconnected {
                        reason: "closed by controller".to_string(),
                    })
                    .await;
                break;
            }
            PollStep::Ignore => {}
        }
    }
}

fn describe_error(e: &ConnectionError) -> String {
    match e {
        ConnectionError::ConnectionRefused(code) => format!("refused: {code:?}"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, Publish};

    #[test]
    fn connack_success_is_accepted() {
        let ev = Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::Success,
            false,
        )));
        assert_eq!(classify(ev), PollStep::Accepted);
    }

    #[test]
    fn connack_failure_is_refused() {
        let ev = Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::NotAuthorized,
            false,
        )));
        assert!(matches!(classify(ev), PollStep::Refused(_)));
    }

    #[test]
    fn publish_carries_topic_and_payload() {
        let ev = Event::Incoming(Packet::Publish(Publish::new(
            "verifynger/system/health",
            QoS::AtMostOnce,
            b"{}".to_vec(),
        )));
        assert_eq!(
            classify(ev),
            PollStep::Message {
                topic: "verifynger/system/health".into(),
                payload: b"{}".to_vec(),
            }
        );
    }

    #[test]
    fn outgoing_disconnect_ends_session() {
        assert_eq!(
            classify(Event::Outgoing(Outgoing::Disconnect)),
            PollStep::ClosedLocally
        );
        assert_eq!(classify(Event::Outgoing(Outgoing::PingReq)), PollStep::Ignore);
    }

    #[test]
    fn generated_client_ids_differ() {
        let a = generate_client_id();
        assert!(a.starts_with("verifynger-"));
        assert_ne!(a, generate_client_id());
    }

    #[tokio::test]
    async fn shutdown_closes_notification_channel() {
        let (tx, mut rx) = spawn_bus(BusConfig::default());

        tx.send(BusCommand::Subscribe("t".into())).await.unwrap();
        tx.send(BusCommand::Disconnect).await.unwrap();
        tx.send(BusCommand::Shutdown).await.unwrap();

        assert_eq!(rx.recv().await, None);
    }
}
