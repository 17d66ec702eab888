use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("JSON error on topic {topic}: {source}")]
    Json {
        topic: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unhandled topic: {0}")]
    UnknownTopic(String),

    #[error("Unknown sensor: {0}")]
    UnknownSensor(String),

    #[error("Unknown mode: {0}")]
    UnknownMode(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
