//! Inbound Events
//!
//! Frames delivered by the push channel and the typed events decoded from
//! them. Decoding is where every payload is validated: once an
//! [`InboundEvent`] exists, applying it to the stores cannot fail.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::lenient;
use crate::schedule::{ActivityState, ScheduleActivity, parse_timestamp};
use crate::unit::{Location, SensorReading, UnitPatch, UnitState};

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Reasons an inbound event is rejected as malformed
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Invalid frame: {0}")]
    Frame(#[source] serde_json::Error),

    #[error("Invalid {kind} payload: {source}")]
    Payload {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("Missing field unit identifier")]
    MissingUnitId,

    #[error("Invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp { value: String, reason: String },

    #[error("Activity for {unit_id} ends at {end}, not after its start at {start}")]
    EmptyInterval {
        unit_id: String,
        start: String,
        end: String,
    },

    #[error("Unknown activity state: {0}")]
    UnknownActivityState(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Envelope
// ─────────────────────────────────────────────────────────────────────────────

/// One frame received from the push channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Channel topic the frame was published on (e.g. "client_data_update")
    pub topic: String,

    /// Raw payload
    #[serde(default)]
    pub data: Value,

    /// When the frame was received; defaults to decode time
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl Envelope {
    /// Create a frame received now
    pub fn new(topic: impl Into<String>, data: Value) -> Self {
        Self {
            topic: topic.into(),
            data,
            received_at: Utc::now(),
        }
    }

    /// Decode a frame from its JSON text form
    pub fn from_json(text: &str) -> Result<Self, EventError> {
        serde_json::from_str(text).map_err(EventError::Frame)
    }

    /// Override the receive time
    pub fn at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Event kinds
// ─────────────────────────────────────────────────────────────────────────────

/// The event shapes the reconciler understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Full, authoritative list of units
    RegistryReplace,
    /// Sparse update for one unit
    Patch,
    /// Whole schedule lists for one or more units
    ScheduleUpdate,
    /// Explicit deletion of one unit
    Removal,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RegistryReplace => "registry_replace",
            Self::Patch => "patch",
            Self::ScheduleUpdate => "schedule_update",
            Self::Removal => "removal",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated inbound event
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Every entry is applied as a sparse patch over the unit's previous
    /// attributes; units absent from the list are dropped.
    RegistryReplace(Vec<UnitPatch>),
    Patch(UnitPatch),
    ScheduleUpdate(BTreeMap<String, Vec<ScheduleActivity>>),
    Removal(String),
}

impl InboundEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::RegistryReplace(_) => EventKind::RegistryReplace,
            Self::Patch(_) => EventKind::Patch,
            Self::ScheduleUpdate(_) => EventKind::ScheduleUpdate,
            Self::Removal(_) => EventKind::Removal,
        }
    }

    /// Decode and validate a payload of the given kind
    pub fn decode(kind: EventKind, data: &Value) -> Result<Self, EventError> {
        let payload = |source| EventError::Payload { kind, source };

        match kind {
            EventKind::RegistryReplace => {
                let entries = match RawRegistry::deserialize(data).map_err(payload)? {
                    RawRegistry::List(entries) => entries,
                    RawRegistry::Wrapped { clients } => clients,
                };
                let patches = entries
                    .into_iter()
                    .map(RawPatch::into_patch)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::RegistryReplace(patches))
            }
            EventKind::Patch => {
                let raw = RawPatch::deserialize(data).map_err(payload)?;
                Ok(Self::Patch(raw.into_patch()?))
            }
            EventKind::ScheduleUpdate => {
                let raw =
                    BTreeMap::<String, Vec<RawActivity>>::deserialize(data).map_err(payload)?;
                let mut schedules = BTreeMap::new();
                for (unit_id, activities) in raw {
                    let unit_id = unit_id.trim().to_string();
                    if unit_id.is_empty() {
                        return Err(EventError::MissingUnitId);
                    }
                    let activities = activities
                        .into_iter()
                        .map(|raw| raw.into_activity(&unit_id))
                        .collect::<Result<Vec<_>, _>>()?;
                    schedules.insert(unit_id, activities);
                }
                Ok(Self::ScheduleUpdate(schedules))
            }
            EventKind::Removal => {
                let raw = RawRemoval::deserialize(data).map_err(payload)?;
                raw.fu_id
                    .map(Self::Removal)
                    .ok_or(EventError::MissingUnitId)
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire shapes
// ─────────────────────────────────────────────────────────────────────────────

/// Registry payloads arrive either bare or wrapped as `{"clients": [...]}`
#[derive(Deserialize)]
#[serde(untagged)]
enum RawRegistry {
    List(Vec<RawPatch>),
    Wrapped { clients: Vec<RawPatch> },
}

#[derive(Deserialize)]
struct RawPatch {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    fu_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    state: Option<String>,
    #[serde(default, alias = "gps")]
    location: Option<RawLocation>,
    #[serde(default)]
    sensor_data: Option<RawSensor>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    az: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    el: Option<f64>,
    #[serde(default, alias = "satellite_name", deserialize_with = "lenient::opt_string")]
    satellite: Option<String>,
}

impl RawPatch {
    fn into_patch(self) -> Result<UnitPatch, EventError> {
        let id = self.fu_id.ok_or(EventError::MissingUnitId)?;
        let sensor = self.sensor_data.map(RawSensor::into_reading);

        Ok(UnitPatch {
            id,
            state: self.state.as_deref().map(UnitState::parse),
            location: self.location.and_then(RawLocation::into_location),
            sensor: sensor.filter(|s| !s.is_empty()),
            azimuth: self.az,
            elevation: self.el,
            satellite: self.satellite,
        })
    }
}

/// Partial coordinates are treated as no fix at all
#[derive(Deserialize)]
struct RawLocation {
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    longitude: Option<f64>,
}

impl RawLocation {
    fn into_location(self) -> Option<Location> {
        Some(Location::new(self.latitude?, self.longitude?))
    }
}

#[derive(Deserialize)]
struct RawSensor {
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    temperature: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    humidity: Option<f64>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

impl RawSensor {
    fn into_reading(self) -> SensorReading {
        SensorReading {
            temperature: self.temperature,
            humidity: self.humidity,
            extra: self
                .extra
                .into_iter()
                .filter(|(_, value)| !value.is_null())
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct RawActivity {
    start_time: String,
    end_time: String,
    satellite: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    state: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    norad_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    max_elevation_deg: Option<f64>,
}

impl RawActivity {
    fn into_activity(self, unit_id: &str) -> Result<ScheduleActivity, EventError> {
        let start = parse_timestamp(&self.start_time)?;
        let end = parse_timestamp(&self.end_time)?;
        let state = match self.state.as_deref() {
            Some(state) => ActivityState::parse(state)?,
            None => ActivityState::default(),
        };

        let mut activity = ScheduleActivity::new(unit_id, start, end, self.satellite)?;
        activity.state = state;
        activity.norad_id = self.norad_id;
        activity.max_elevation_deg = self.max_elevation_deg;
        Ok(activity)
    }
}

#[derive(Deserialize)]
struct RawRemoval {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    fu_id: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
