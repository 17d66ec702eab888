//! JSON wire protocol between the controller and the sensor node.
//!
//! Inbound payloads are decoded into [`InboundMessage`], one variant per
//! topic, so the router can dispatch with an exhaustive `match`. Outbound
//! payloads are built as [`OutboundMessage`] and know their own topic.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::constants::*;
use crate::error::ProtocolError;
use crate::types::{Mode, Sensor};

// ---------------------------------------------------------------------------
// Payload text decoding
// ---------------------------------------------------------------------------

/// Character encoding a payload was read with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadEncoding {
    Utf8,
    /// UTF-8 failed; every byte was mapped to the code point of equal value.
    Latin1,
}

/// Decode payload bytes as UTF-8, falling back to Latin-1 which accepts any
/// byte sequence.
pub fn decode_text(payload: &[u8]) -> (Cow<'_, str>, PayloadEncoding) {
    match std::str::from_utf8(payload) {
        Ok(text) => (Cow::Borrowed(text), PayloadEncoding::Utf8),
        Err(_) => {
            let text: String = payload.iter().map(|&b| b as char).collect();
            (Cow::Owned(text), PayloadEncoding::Latin1)
        }
    }
}

// ---------------------------------------------------------------------------
// Lenient field decoding
// ---------------------------------------------------------------------------

// The node's JSON encoder is loose about numeric types: scores arrive as
// `87` or `87.5`, voltages as ints, and unset strings as `null`. A field of
// the wrong shape reads as absent instead of failing the whole message.

fn int_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.round() as i64))
        }
        _ => None,
    }
}

fn float_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn opt_int<'de, D: Deserializer<'de>>(de: D) -> Result<Option<i64>, D::Error> {
    Ok(Option::<Value>::deserialize(de)?.as_ref().and_then(int_of))
}

fn int_or_zero<'de, D: Deserializer<'de>>(de: D) -> Result<i64, D::Error> {
    Ok(opt_int(de)?.unwrap_or_default())
}

fn uint_or_zero<'de, D: Deserializer<'de>>(de: D) -> Result<u64, D::Error> {
    let value = Option::<Value>::deserialize(de)?;
    let n = match &value {
        Some(Value::Number(n)) => n.as_u64().or_else(|| n.as_f64().map(|f| f.round() as u64)),
        Some(other) => int_of(other).and_then(|n| u64::try_from(n).ok()),
        None => None,
    };
    Ok(n.unwrap_or_default())
}

fn float_or_zero<'de, D: Deserializer<'de>>(de: D) -> Result<f64, D::Error> {
    Ok(Option::<Value>::deserialize(de)?
        .as_ref()
        .and_then(float_of)
        .unwrap_or_default())
}

fn text_or_unknown<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    Ok(match Option::<Value>::deserialize(de)? {
        Some(Value::String(s)) => s,
        _ => unknown(),
    })
}

// ---------------------------------------------------------------------------
// Inbound messages
// ---------------------------------------------------------------------------

/// Every message the controller consumes, tagged by topic.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    /// `response/template`: outcome of an enrollment scan
    Template(TemplateResult),
    /// `response/status`: acknowledgements and state changes
    Status(StatusReport),
    /// `response/error`
    PeerError(PeerError),
    /// `verify/request`: the node matched a finger and asks who it is
    VerifyRequest(VerifyRequest),
    /// `verify/response`: our own answers echoed back, or legacy node-side results
    VerifyResult(VerifyResultReport),
    /// `system/health`
    Health(HealthReport),
    /// `sensor/metrics`
    Metrics(MetricsReport),
}

/// A decoded inbound message plus the encoding its text was read with.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub message: InboundMessage,
    pub encoding: PayloadEncoding,
}

impl InboundMessage {
    /// Decode a raw bus message. Unknown topics and malformed JSON are errors;
    /// the caller logs and drops them.
    pub fn decode(topic: &str, payload: &[u8]) -> Result<Decoded, ProtocolError> {
        let (text, encoding) = decode_text(payload);
        let json_err = |source: serde_json::Error| ProtocolError::Json {
            topic: topic.to_string(),
            source,
        };

        let message = match topic {
            TOPIC_RES_TEMPLATE => {
                InboundMessage::Template(serde_json::from_str(&text).map_err(json_err)?)
            }
            TOPIC_RES_STATUS => {
                InboundMessage::Status(serde_json::from_str(&text).map_err(json_err)?)
            }
            TOPIC_RES_ERROR => {
                InboundMessage::PeerError(serde_json::from_str(&text).map_err(json_err)?)
            }
            TOPIC_VERIFY_REQUEST => {
                InboundMessage::VerifyRequest(serde_json::from_str(&text).map_err(json_err)?)
            }
            TOPIC_VERIFY_RESPONSE => {
                InboundMessage::VerifyResult(serde_json::from_str(&text).map_err(json_err)?)
            }
            TOPIC_SYS_HEALTH => {
                InboundMessage::Health(serde_json::from_str(&text).map_err(json_err)?)
            }
            TOPIC_SENSOR_METRICS => {
                let raw: BTreeMap<String, Value> =
                    serde_json::from_str(&text).map_err(json_err)?;
                InboundMessage::Metrics(MetricsReport::from_raw(raw).map_err(json_err)?)
            }
            other => return Err(ProtocolError::UnknownTopic(other.to_string())),
        };

        Ok(Decoded { message, encoding })
    }

    /// Short name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::Template(_) => "template",
            InboundMessage::Status(_) => "status",
            InboundMessage::PeerError(_) => "error",
            InboundMessage::VerifyRequest(_) => "verify_request",
            InboundMessage::VerifyResult(_) => "verify_response",
            InboundMessage::Health(_) => "health",
            InboundMessage::Metrics(_) => "metrics",
        }
    }
}

/// Result of an enrollment scan. A missing hash means the scan failed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateResult {
    #[serde(default)]
    pub fingerprint_hash: Option<String>,
    #[serde(default)]
    pub sensor: Option<String>,
    #[serde(default)]
    pub fingerprint_id: Option<Value>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Status values the controller reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusKind {
    ModeChanged,
    SensorChanged,
    EnrollStarted,
    EnrollComplete,
    Other(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusReport {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub sensor: Option<String>,
}

impl StatusReport {
    pub fn kind(&self) -> StatusKind {
        match self.status.as_str() {
            "mode_changed" => StatusKind::ModeChanged,
            "sensor_changed" => StatusKind::SensorChanged,
            "enroll_started" => StatusKind::EnrollStarted,
            "enroll_complete" => StatusKind::EnrollComplete,
            other => StatusKind::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PeerError {
    #[serde(default, deserialize_with = "opt_int")]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl PeerError {
    /// Firmware name of the error code, when it is one the node defines.
    pub fn code_name(&self) -> Option<&'static str> {
        self.error_code.and_then(peer_error_name)
    }
}

/// Names of the node's numeric error codes.
pub fn peer_error_name(code: i64) -> Option<&'static str> {
    let name = match code {
        0 => "NONE",
        1 => "SENSOR_TIMEOUT",
        2 => "SENSOR_NOT_FOUND",
        3 => "SENSOR_BAD_IMAGE",
        4 => "SENSOR_NO_MATCH",
        5 => "SENSOR_COMM_ERROR",
        10 => "WIFI_DISCONNECTED",
        11 => "WIFI_TIMEOUT",
        12 => "MQTT_DISCONNECTED",
        13 => "MQTT_TIMEOUT",
        14 => "MQTT_PARSE_ERROR",
        20 => "LOW_MEMORY",
        21 => "RELAY_STUCK",
        22 => "TEMPLATE_ENCODE_ERROR",
        23 => "UNKNOWN_COMMAND",
        30 => "ZW101_NOT_SUPPORTED",
        _ => return None,
    };
    Some(name)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub fingerprint_hash: Option<String>,
    /// Any JSON number; fractions are rounded.
    #[serde(default, deserialize_with = "opt_int")]
    pub match_score: Option<i64>,
    #[serde(default)]
    pub sensor: Option<String>,
    #[serde(default)]
    pub fingerprint_id: Option<Value>,
}

/// How a message seen on `verify/response` should be treated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResultKind {
    /// Node-side match by user id (older firmware)
    PeerMatch,
    /// Node-side rejection (older firmware)
    PeerNoMatch,
    /// Our own MATCH / NO_MATCH answer coming back through the subscription
    Echo,
    Other(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyResultReport {
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "opt_int")]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default, deserialize_with = "opt_int")]
    pub match_score: Option<i64>,
    #[serde(default)]
    pub sensor: Option<String>,
}

impl VerifyResultReport {
    pub fn kind(&self) -> VerifyResultKind {
        match self.status.as_str() {
            "success" => VerifyResultKind::PeerMatch,
            "no_match" => VerifyResultKind::PeerNoMatch,
            "MATCH" | "NO_MATCH" => VerifyResultKind::Echo,
            other => VerifyResultKind::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthReport {
    #[serde(default = "unknown", deserialize_with = "text_or_unknown")]
    pub state: String,
    #[serde(default = "unknown", deserialize_with = "text_or_unknown")]
    pub mode: String,
    #[serde(default = "unknown", deserialize_with = "text_or_unknown")]
    pub sensor: String,
    #[serde(default, deserialize_with = "int_or_zero")]
    pub wifi_rssi: i64,
    #[serde(default, deserialize_with = "uint_or_zero")]
    pub free_heap: u64,
    #[serde(default, deserialize_with = "uint_or_zero")]
    pub uptime_ms: u64,
    #[serde(default)]
    pub relay_state: Option<Value>,
    #[serde(default, deserialize_with = "float_or_zero")]
    pub battery_voltage: f64,
}

fn unknown() -> String {
    "unknown".to_string()
}

impl HealthReport {
    /// Sensor the node reports as active, if it names a known one.
    pub fn active_sensor(&self) -> Option<Sensor> {
        Sensor::from_name(&self.sensor)
    }

    /// Mode the node reports, if it names a known one.
    pub fn reported_mode(&self) -> Option<Mode> {
        if self.mode == "unknown" {
            return None;
        }
        self.mode.parse().ok()
    }

    pub fn uptime_display(&self) -> String {
        format_uptime(self.uptime_ms)
    }

    pub fn relay_display(&self) -> String {
        match &self.relay_state {
            None | Some(Value::Null) => "closed".to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Bool(true)) => "open".to_string(),
            Some(Value::Bool(false)) => "closed".to_string(),
            Some(other) => other.to_string(),
        }
    }
}

/// `XhYmZs` rendering of a millisecond uptime.
pub fn format_uptime(uptime_ms: u64) -> String {
    let secs = uptime_ms / 1000;
    format!("{}h{}m{}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Per-sensor counters as tracked by the node itself.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SensorSnapshot {
    #[serde(default, deserialize_with = "uint_or_zero")]
    pub total_scans: u64,
    #[serde(default, deserialize_with = "uint_or_zero")]
    pub success_count: u64,
    #[serde(default, deserialize_with = "uint_or_zero")]
    pub fail_count: u64,
    #[serde(default, deserialize_with = "float_or_zero")]
    pub avg_confidence: f64,
    #[serde(default, deserialize_with = "float_or_zero")]
    pub avg_response_time: f64,
    #[serde(default, deserialize_with = "uint_or_zero")]
    pub last_scan_time: u64,
}

/// Full metrics report, keyed by sensor. Keys that are not sensor names are
/// ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsReport {
    pub sensors: BTreeMap<Sensor, SensorSnapshot>,
}

impl MetricsReport {
    fn from_raw(raw: BTreeMap<String, Value>) -> Result<Self, serde_json::Error> {
        let mut sensors = BTreeMap::new();
        for (key, value) in raw {
            if let Some(sensor) = Sensor::from_name(&key) {
                sensors.insert(sensor, serde_json::from_value(value)?);
            }
        }
        Ok(Self { sensors })
    }
}

// ---------------------------------------------------------------------------
// Outbound messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeCommand {
    pub mode: Mode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrollCommand {
    pub action: String,
    pub name: String,
    pub email: String,
    pub position: String,
    /// Unix seconds
    pub timestamp: i64,
}

impl EnrollCommand {
    /// Start a scan. No user id is sent: the operator picks it at commit time.
    pub fn start(
        name: impl Into<String>,
        email: Option<&str>,
        position: Option<&str>,
        timestamp: i64,
    ) -> Self {
        Self {
            action: "start".to_string(),
            name: name.into(),
            email: email.unwrap_or_default().to_string(),
            position: position.unwrap_or_default().to_string(),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorCommand {
    pub sensor_id: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayAction {
    Unlock,
    Lock,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayCommand {
    pub action: RelayAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerifyStatus {
    #[serde(rename = "MATCH")]
    Match,
    #[serde(rename = "NO_MATCH")]
    NoMatch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifyResponse {
    pub status: VerifyStatus,
    pub user_id: i64,
    pub user_name: String,
    pub match_score: i64,
}

impl VerifyResponse {
    pub fn matched(user_id: i64, user_name: impl Into<String>, match_score: i64) -> Self {
        Self {
            status: VerifyStatus::Match,
            user_id,
            user_name: user_name.into(),
            match_score,
        }
    }

    pub fn no_match() -> Self {
        Self {
            status: VerifyStatus::NoMatch,
            user_id: 0,
            user_name: UNKNOWN_USER_NAME.to_string(),
            match_score: 0,
        }
    }
}

/// Every message the controller publishes.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Mode(ModeCommand),
    Enroll(EnrollCommand),
    Sensor(SensorCommand),
    Relay(RelayCommand),
    VerifyResponse(VerifyResponse),
}

impl OutboundMessage {
    pub fn topic(&self) -> &'static str {
        match self {
            OutboundMessage::Mode(_) => TOPIC_CMD_MODE,
            OutboundMessage::Enroll(_) => TOPIC_CMD_ENROLL,
            OutboundMessage::Sensor(_) => TOPIC_CMD_SENSOR,
            OutboundMessage::Relay(_) => TOPIC_CMD_RELAY,
            OutboundMessage::VerifyResponse(_) => TOPIC_VERIFY_RESPONSE,
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, ProtocolError> {
        let bytes = match self {
            OutboundMessage::Mode(m) => serde_json::to_vec(m)?,
            OutboundMessage::Enroll(m) => serde_json::to_vec(m)?,
            OutboundMessage::Sensor(m) => serde_json::to_vec(m)?,
            OutboundMessage::Relay(m) => serde_json::to_vec(m)?,
            OutboundMessage::VerifyResponse(m) => serde_json::to_vec(m)?,
        };
        Ok(bytes)
    }
}
