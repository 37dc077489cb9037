//! Shared types for the node time-sync status snapshot
//!
//! These types are produced by the chrony and gpsd sources, held by the
//! [`StatusStore`](super::StatusStore) and consumed by the node reconciler
//! and the REST API.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Tri-state synchronization verdict
///
/// Serialized as JSON `true`, `false` or `null`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Synced {
    True,
    False,
    /// No chrony status is available
    #[default]
    Unknown,
}

impl Synced {
    pub fn as_str(&self) -> &'static str {
        match self {
            Synced::True => "true",
            Synced::False => "false",
            Synced::Unknown => "unknown",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Synced::True => Some(true),
            Synced::False => Some(false),
            Synced::Unknown => None,
        }
    }
}

impl From<Option<bool>> for Synced {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Synced::True,
            Some(false) => Synced::False,
            None => Synced::Unknown,
        }
    }
}

impl std::fmt::Display for Synced {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Synced {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_bool().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Synced {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<bool>::deserialize(deserializer).map(Synced::from)
    }
}

/// How chrony is associated with a time source
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    Server,
    Peer,
    RefClock,
    Unknown,
}

impl SourceMode {
    /// Map the chronyc mode indicator (`^`, `=`, `#`)
    pub fn from_symbol(symbol: char) -> Self {
        match symbol {
            '^' => SourceMode::Server,
            '=' => SourceMode::Peer,
            '#' => SourceMode::RefClock,
            _ => SourceMode::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceMode::Server => "server",
            SourceMode::Peer => "peer",
            SourceMode::RefClock => "ref_clock",
            SourceMode::Unknown => "unknown",
        }
    }
}

/// Selection state chrony assigned to a time source
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceState {
    /// Currently selected sync source
    Synced,
    /// Acceptable, combined with the selected source
    Combined,
    /// Excluded by the combining algorithm
    Excluded,
    /// Connectivity lost or not yet valid
    Lost,
    /// Falseticker
    False,
    /// Variance too large
    TooVariable,
    Unknown,
}

impl SourceState {
    /// Map the chronyc state indicator (`*`, `+`, `-`, `?`, `x`, `~`)
    pub fn from_symbol(symbol: char) -> Self {
        match symbol {
            '*' => SourceState::Synced,
            '+' => SourceState::Combined,
            '-' => SourceState::Excluded,
            '?' => SourceState::Lost,
            'x' => SourceState::False,
            '~' => SourceState::TooVariable,
            _ => SourceState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceState::Synced => "synced",
            SourceState::Combined => "combined",
            SourceState::Excluded => "excluded",
            SourceState::Lost => "lost",
            SourceState::False => "false",
            SourceState::TooVariable => "too_variable",
            SourceState::Unknown => "unknown",
        }
    }
}

/// Pending leap second indicator, classified from the raw tracking column
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeapStatus {
    Normal,
    Insert,
    Delete,
    Unknown,
}

impl LeapStatus {
    /// Accepts both the single letter form (`n`, `i`, `d`) and chronyc's
    /// long form (`Normal`, `Insert second`, `Delete second`).
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "n" | "normal" => LeapStatus::Normal,
            "i" | "insert" | "insert second" => LeapStatus::Insert,
            "d" | "delete" | "delete second" => LeapStatus::Delete,
            _ => LeapStatus::Unknown,
        }
    }
}

/// One candidate time reference reported by `chronyc sources`
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct SourceRecord {
    pub mode: SourceMode,
    pub state: SourceState,
    pub stratum: u32,
    /// Polling interval as a base-2 logarithm of seconds
    pub poll: i32,
    /// Reachability register, decoded from chronyc's octal display
    pub reach: u16,
    /// Seconds since the last good sample, if any was received
    pub last_rx: Option<u64>,
    /// Offset of the last sample in seconds
    pub last_sample: f64,
}

/// Parsed output of `chronyc -ncm tracking sources`
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ChronyStatus {
    pub ref_id: u32,
    pub ref_name: String,
    pub stratum: u32,
    pub ref_time: DateTime<Utc>,
    pub current_correction: f64,
    pub last_offset: f64,
    pub rms_offset: f64,
    pub freq_ppm: f64,
    pub resid_freq_ppm: f64,
    pub skew_ppm: f64,
    pub root_delay: f64,
    pub root_dispersion: f64,
    pub last_update_interval: f64,
    /// Lowercased raw leap status column
    pub leap_status: String,
    pub sources: BTreeMap<String, SourceRecord>,
}

impl ChronyStatus {
    pub fn leap(&self) -> LeapStatus {
        LeapStatus::parse(&self.leap_status)
    }

    /// Name of the currently selected sync source, if any
    pub fn sync_source(&self) -> Option<&str> {
        self.sources
            .iter()
            .find(|(_, source)| source.state == SourceState::Synced)
            .map(|(name, _)| name.as_str())
    }
}

/// Most recent gpsd report per class, keyed by lowercased class name
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct GpsdStatus(BTreeMap<String, serde_json::Value>);

impl GpsdStatus {
    pub fn insert(&mut self, class: String, record: serde_json::Value) {
        self.0.insert(class, record);
    }

    pub fn get(&self, class: &str) -> Option<&serde_json::Value> {
        self.0.get(class)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode the latest TPV report
    ///
    /// Returns `None` when no TPV report was received yet or it is not an
    /// object.
    pub fn tpv(&self) -> Option<Tpv> {
        self.get("tpv")
            .filter(|value| value.is_object())
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

/// Time-Position-Velocity report fields used for node annotations
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Tpv {
    pub mode: Option<i64>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt: Option<f64>,
    pub time: Option<String>,
    pub status: Option<i64>,
}

impl Tpv {
    pub fn fix(&self) -> GpsFix {
        match self.mode {
            Some(1) => GpsFix::None,
            Some(2) => GpsFix::TwoD,
            Some(3) => GpsFix::ThreeD,
            _ => GpsFix::Unknown,
        }
    }

    pub fn fix_status(&self) -> GpsFixStatus {
        if self.status == Some(2) {
            GpsFixStatus::Dgps
        } else {
            GpsFixStatus::None
        }
    }
}

/// GPS fix dimension derived from the TPV mode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GpsFix {
    None,
    TwoD,
    ThreeD,
    Unknown,
}

impl GpsFix {
    pub fn as_str(&self) -> &'static str {
        match self {
            GpsFix::None => "none",
            GpsFix::TwoD => "2d",
            GpsFix::ThreeD => "3d",
            GpsFix::Unknown => "unknown",
        }
    }
}

/// Differential GPS indicator derived from the TPV status flag
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GpsFixStatus {
    Dgps,
    None,
}

impl GpsFixStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GpsFixStatus::Dgps => "dgps",
            GpsFixStatus::None => "none",
        }
    }
}

/// Latest merged status of the node
///
/// Fields are written independently by different producers, so the snapshot
/// is only eventually consistent across fields.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct StatusSnapshot {
    pub chrony: Option<ChronyStatus>,
    pub gpsd: Option<GpsdStatus>,
    pub synced: Synced,
    /// Time of the last write to any field
    pub updated: Option<DateTime<Utc>>,
}

impl StatusSnapshot {
    /// True until the first producer has written to the snapshot
    pub fn is_empty(&self) -> bool {
        self.updated.is_none()
    }
}
