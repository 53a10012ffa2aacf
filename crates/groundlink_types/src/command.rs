//! Outbound Commands
//!
//! Commands an operator can issue to a field unit. They travel one way; any
//! confirmation comes back later as an ordinary inbound event.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// An angle as typed by an operator: a number or numeric text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(untagged)]
pub enum Angle {
    Degrees(f64),
    Text(String),
}

impl Angle {
    /// Numeric value in degrees, if the angle is a finite number
    pub fn degrees(&self) -> Option<f64> {
        let value = match self {
            Self::Degrees(value) => *value,
            Self::Text(text) => text.trim().parse().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

impl From<f64> for Angle {
    fn from(value: f64) -> Self {
        Self::Degrees(value)
    }
}

impl From<&str> for Angle {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// The closed set of unit commands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Slew the antenna to a fixed azimuth/elevation
    ManualPoint { az: Angle, el: Angle },
    /// Ask the unit to report telemetry now
    TelemetryRequest,
    /// Take the unit out of service
    Disable,
}

impl Command {
    pub fn manual_point(az: impl Into<Angle>, el: impl Into<Angle>) -> Self {
        Self::ManualPoint {
            az: az.into(),
            el: el.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ManualPoint { .. } => "manual_point",
            Self::TelemetryRequest => "telemetry_request",
            Self::Disable => "disable",
        }
    }
}

/// Outbound command message, as sent on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CommandMessage {
    pub fu_id: String,
    pub command: Command,
}
