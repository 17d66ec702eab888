/// Application name
pub const APP_NAME: &str = "VeriFynger";

/// Outbound command topics
pub const TOPIC_CMD_MODE: &str = "verifynger/command/mode";
pub const TOPIC_CMD_ENROLL: &str = "verifynger/command/enroll";
pub const TOPIC_CMD_SENSOR: &str = "verifynger/command/sensor";
pub const TOPIC_CMD_RELAY: &str = "verifynger/command/relay";

/// Responses published by the sensor node
pub const TOPIC_RES_TEMPLATE: &str = "verifynger/response/template";
pub const TOPIC_RES_STATUS: &str = "verifynger/response/status";
pub const TOPIC_RES_ERROR: &str = "verifynger/response/error";

/// Verification round trip
pub const TOPIC_VERIFY_REQUEST: &str = "verifynger/verify/request";
pub const TOPIC_VERIFY_RESPONSE: &str = "verifynger/verify/response";

/// Periodic reports from the sensor node
pub const TOPIC_SYS_HEALTH: &str = "verifynger/system/health";
pub const TOPIC_SENSOR_METRICS: &str = "verifynger/sensor/metrics";

/// Every topic the controller subscribes to once the broker accepts it.
pub const INBOUND_TOPICS: [&str; 7] = [
    TOPIC_RES_TEMPLATE,
    TOPIC_RES_STATUS,
    TOPIC_RES_ERROR,
    TOPIC_VERIFY_REQUEST,
    TOPIC_VERIFY_RESPONSE,
    TOPIC_SYS_HEALTH,
    TOPIC_SENSOR_METRICS,
];

/// Default public broker, matching the firmware defaults
pub const DEFAULT_MQTT_BROKER: &str = "test.mosquitto.org";
pub const DEFAULT_MQTT_PORT: u16 = 1883;
pub const MQTT_KEEP_ALIVE_SECS: u64 = 60;

/// Settings keys persisted in the store
pub const SETTING_MQTT_BROKER: &str = "mqtt_broker";
pub const SETTING_MQTT_PORT: &str = "mqtt_port";

/// Valid operator-assigned user ids
pub const USER_ID_MIN: i64 = 1;
pub const USER_ID_MAX: i64 = 200;

/// Score assumed when the node omits one
pub const DEFAULT_MATCH_SCORE: i64 = 95;

/// Upper bound of a sensor confidence score
pub const MAX_CONFIDENCE: f64 = 100.0;

/// Name returned in a NO_MATCH verification response
pub const UNKNOWN_USER_NAME: &str = "Unknown";

/// Row cap for attendance log listings
pub const DEFAULT_LOG_LIMIT: u32 = 1000;

/// How long the door relay stays open by default (milliseconds)
pub const RELAY_DEFAULT_DURATION_MS: u64 = 5000;

/// Bounded waits for peer answers
pub const DEFAULT_ENROLL_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CONFIRM_TIMEOUT_SECS: u64 = 10;

/// Timestamp layout used for every persisted and displayed wall-clock time
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
