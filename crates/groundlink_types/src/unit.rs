//! Field Unit Model
//!
//! A field unit is a remote ground-station device identified by a stable
//! string id. Units are mutated only through sparse [`UnitPatch`]es so that
//! a field missing from an update never clears a previously reported value.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

/// Operational status of a field unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitState {
    Idle,
    Tracking,
    Disabled,
    #[default]
    Unknown,
}

impl UnitState {
    /// Parse a reported state. Unrecognised values map to `Unknown` so that
    /// new firmware states never cause an update to be rejected.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "IDLE" => Self::Idle,
            "TRACKING" => Self::Tracking,
            "DISABLED" => Self::Disabled,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Tracking => "TRACKING",
            Self::Disabled => "DISABLED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for UnitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// GPS position of a unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Environmental sensor payload
///
/// Temperature and humidity are the readings every unit reports. Anything
/// else a unit sends is kept verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SensorReading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl SensorReading {
    /// True when the reading carries no value at all
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.humidity.is_none() && self.extra.is_empty()
    }

    /// Overlay every value present in `other` onto this reading
    pub fn overlay(&mut self, other: &SensorReading) {
        if other.temperature.is_some() {
            self.temperature = other.temperature;
        }
        if other.humidity.is_some() {
            self.humidity = other.humidity;
        }
        for (key, value) in &other.extra {
            self.extra.insert(key.clone(), value.clone());
        }
    }
}

/// Antenna pointing, in degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Pointing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azimuth: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f64>,
}

/// Last-known attributes of a field unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FieldUnit {
    pub id: String,
    #[serde(default)]
    pub state: UnitState,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub sensor_reading: Option<SensorReading>,
    #[serde(default)]
    pub pointing: Option<Pointing>,
    /// Satellite currently tracked; `None` when the unit is not tracking
    #[serde(default)]
    pub tracked_satellite: Option<String>,
    /// Receive time of the last event that touched this unit
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

impl FieldUnit {
    /// Create a unit with every attribute at its default
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: UnitState::Unknown,
            location: None,
            sensor_reading: None,
            pointing: None,
            tracked_satellite: None,
            last_seen: None,
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.tracked_satellite.is_some()
    }

    /// The live-data block a dashboard refreshes in place on update
    pub fn live_data(&self) -> LiveData {
        LiveData {
            state: self.state,
            location: self.location,
            sensor_reading: self.sensor_reading.clone(),
            pointing: self.pointing,
            tracked_satellite: self.tracked_satellite.clone(),
            last_seen: self.last_seen,
        }
    }
}

/// Refreshable subset of a [`FieldUnit`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LiveData {
    pub state: UnitState,
    pub location: Option<Location>,
    pub sensor_reading: Option<SensorReading>,
    pub pointing: Option<Pointing>,
    pub tracked_satellite: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Sparse update for a single unit
///
/// Every `None` means "not present in the update" and leaves the current
/// value alone. Patches are produced by decoding inbound events, which
/// already folds blank strings, `null`s and empty objects into `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitPatch {
    pub id: String,
    pub state: Option<UnitState>,
    pub location: Option<Location>,
    pub sensor: Option<SensorReading>,
    pub azimuth: Option<f64>,
    pub elevation: Option<f64>,
    pub satellite: Option<String>,
}

impl UnitPatch {
    /// A patch carrying nothing but the identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_state(mut self, state: UnitState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.location = Some(Location::new(latitude, longitude));
        self
    }

    pub fn with_sensor(mut self, sensor: SensorReading) -> Self {
        self.sensor = (!sensor.is_empty()).then_some(sensor);
        self
    }

    pub fn with_pointing(mut self, azimuth: f64, elevation: f64) -> Self {
        self.azimuth = Some(azimuth);
        self.elevation = Some(elevation);
        self
    }

    pub fn with_satellite(mut self, satellite: impl Into<String>) -> Self {
        self.satellite = Some(satellite.into());
        self
    }

    /// True when the patch carries no attribute besides the id
    pub fn is_bare(&self) -> bool {
        self.state.is_none()
            && self.location.is_none()
            && self.sensor.is_none()
            && self.azimuth.is_none()
            && self.elevation.is_none()
            && self.satellite.is_none()
    }

    /// Apply the present fields onto `unit`
    pub fn apply(&self, unit: &mut FieldUnit) {
        if let Some(state) = self.state {
            unit.state = state;
        }
        if let Some(location) = self.location {
            unit.location = Some(location);
        }
        if let Some(sensor) = &self.sensor {
            unit.sensor_reading
                .get_or_insert_with(SensorReading::default)
                .overlay(sensor);
        }
        if self.azimuth.is_some() || self.elevation.is_some() {
            let pointing = unit.pointing.get_or_insert_with(Pointing::default);
            if self.azimuth.is_some() {
                pointing.azimuth = self.azimuth;
            }
            if self.elevation.is_some() {
                pointing.elevation = self.elevation;
            }
        }
        if let Some(satellite) = &self.satellite {
            unit.tracked_satellite = Some(satellite.clone());
        }
    }

    /// Fold a later patch for the same unit into this one.
    ///
    /// Applying the result equals applying `self` then `later`.
    pub fn merge(mut self, later: UnitPatch) -> UnitPatch {
        self.state = later.state.or(self.state);
        self.location = later.location.or(self.location);
        self.sensor = match (self.sensor, later.sensor) {
            (Some(mut earlier), Some(later)) => {
                earlier.overlay(&later);
                Some(earlier)
            }
            (earlier, later) => later.or(earlier),
        };
        self.azimuth = later.azimuth.or(self.azimuth);
        self.elevation = later.elevation.or(self.elevation);
        self.satellite = later.satellite.or(self.satellite);
        self
    }
}
