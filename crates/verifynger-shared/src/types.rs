use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

// ---------------------------------------------------------------------------
// Sensor
// ---------------------------------------------------------------------------

/// One of the fingerprint sensors wired to the node.
///
/// Declaration order is the cycling order and also the index sent in
/// `command/sensor` payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Sensor {
    #[serde(rename = "FPM10A")]
    Fpm10a,
    #[serde(rename = "AS608")]
    As608,
    #[serde(rename = "ZW101")]
    Zw101,
}

impl Sensor {
    pub const ALL: [Sensor; 3] = [Sensor::Fpm10a, Sensor::As608, Sensor::Zw101];

    pub fn name(self) -> &'static str {
        match self {
            Sensor::Fpm10a => "FPM10A",
            Sensor::As608 => "AS608",
            Sensor::Zw101 => "ZW101",
        }
    }

    pub fn index(self) -> u8 {
        match self {
            Sensor::Fpm10a => 0,
            Sensor::As608 => 1,
            Sensor::Zw101 => 2,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Exact, case-sensitive match on the wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    /// Template slots available on the sensor module.
    pub fn capacity(self) -> u32 {
        match self {
            Sensor::Fpm10a => 100,
            Sensor::As608 => 200,
            Sensor::Zw101 => 50,
        }
    }

    /// Next sensor in cycling order, wrapping around.
    pub fn next(self) -> Self {
        let next = (self.index() as usize + 1) % Self::ALL.len();
        Self::ALL[next]
    }
}

impl Default for Sensor {
    fn default() -> Self {
        Sensor::Fpm10a
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Sensor {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::from_name(&upper).ok_or_else(|| ProtocolError::UnknownSensor(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Operating mode of the node: taking attendance or enrolling new users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Presensi,
    Daftar,
}

impl Mode {
    /// Lower-case form used on the wire.
    pub fn wire_name(self) -> &'static str {
        match self {
            Mode::Presensi => "presensi",
            Mode::Daftar => "daftar",
        }
    }

    /// Upper-case form shown to operators.
    pub fn label(self) -> &'static str {
        match self {
            Mode::Presensi => "PRESENSI",
            Mode::Daftar => "DAFTAR",
        }
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Presensi
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Mode {
    type Err = ProtocolError;

    /// Case-insensitive; the node reports lower case, operators type either.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "presensi" => Ok(Mode::Presensi),
            "daftar" => Ok(Mode::Daftar),
            _ => Err(ProtocolError::UnknownMode(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// FingerprintHash
// ---------------------------------------------------------------------------

/// Identifier of an enrolled template slot, formatted `"{SENSOR}_{RAW_ID}"`
/// (for example `AS608_12`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FingerprintHash(String);

impl FingerprintHash {
    /// Returns `None` for blank input; the node signals a failed scan that way.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Sensor named by the prefix before the first `_`, if it is a known one.
    pub fn sensor(&self) -> Option<Sensor> {
        sensor_of_hash(&self.0)
    }
}

impl fmt::Display for FingerprintHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Prefix lookup on a raw hash string; no underscore means no sensor.
pub fn sensor_of_hash(hash: &str) -> Option<Sensor> {
    let (prefix, _) = hash.split_once('_')?;
    Sensor::from_name(prefix)
}
