//! Schedule Activities
//!
//! A schedule activity is one satellite pass assigned to a field unit.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::event::EventError;

/// Progress of a scheduled pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityState {
    #[default]
    Planned,
    Active,
    Done,
}

impl ActivityState {
    /// Parse a wire value (case-insensitive)
    pub fn parse(value: &str) -> Result<Self, EventError> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PLANNED" => Ok(Self::Planned),
            "ACTIVE" => Ok(Self::Active),
            "DONE" => Ok(Self::Done),
            _ => Err(EventError::UnknownActivityState(value.to_string())),
        }
    }
}

/// A tracking task assigned to one field unit
///
/// `end_time` is always strictly after `start_time`; [`ScheduleActivity::new`]
/// is the only constructor and enforces it.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct ScheduleActivity {
    /// Owning unit (back-reference, not ownership)
    pub unit_id: String,
    pub start_time: DateTime<FixedOffset>,
    pub end_time: DateTime<FixedOffset>,
    pub satellite: String,
    pub state: ActivityState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub norad_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_elevation_deg: Option<f64>,
}

impl ScheduleActivity {
    /// Create a planned activity, rejecting empty or inverted intervals
    pub fn new(
        unit_id: impl Into<String>,
        start_time: DateTime<FixedOffset>,
        end_time: DateTime<FixedOffset>,
        satellite: impl Into<String>,
    ) -> Result<Self, EventError> {
        let unit_id = unit_id.into();
        if end_time <= start_time {
            return Err(EventError::EmptyInterval {
                unit_id,
                start: start_time.to_rfc3339(),
                end: end_time.to_rfc3339(),
            });
        }

        Ok(Self {
            unit_id,
            start_time,
            end_time,
            satellite: satellite.into(),
            state: ActivityState::Planned,
            norad_id: None,
            max_elevation_deg: None,
        })
    }

    pub fn with_state(mut self, state: ActivityState) -> Self {
        self.state = state;
        self
    }

    /// Whether `at` falls inside the pass window
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        let at = at.fixed_offset();
        self.start_time <= at && at < self.end_time
    }
}

/// Parse an ISO-8601 timestamp.
///
/// Offsets are honoured; timestamps without one are taken as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<FixedOffset>, EventError> {
    let trimmed = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed);
    }

    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc().fixed_offset())
        .map_err(|e| EventError::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_variants() {
        let utc = parse_timestamp("2024-01-01T00:00:00Z").unwrap();
        let ist = parse_timestamp("2024-01-01T05:30:00+05:30").unwrap();
        let naive = parse_timestamp("2024-01-01T00:00:00").unwrap();
        let fractional = parse_timestamp("2024-01-01T05:30:00.250000+05:30").unwrap();

        assert_eq!(utc, ist);
        assert_eq!(utc, naive);
        assert!(fractional > ist);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_interval_must_be_positive() {
        let start = parse_timestamp("2024-01-01T01:00:00Z").unwrap();
        let end = parse_timestamp("2024-01-01T00:00:00Z").unwrap();

        assert!(matches!(
            ScheduleActivity::new("FU1", start, end, "SAT-A"),
            Err(EventError::EmptyInterval { .. })
        ));
        assert!(ScheduleActivity::new("FU1", start, start, "SAT-A").is_err());

        let activity = ScheduleActivity::new("FU1", end, start, "SAT-A").unwrap();
        assert_eq!(activity.state, ActivityState::Planned);
    }

    #[test]
    fn test_covers() {
        let start = parse_timestamp("2024-01-01T00:00:00Z").unwrap();
        let end = parse_timestamp("2024-01-01T00:10:00Z").unwrap();
        let activity = ScheduleActivity::new("FU1", start, end, "SAT-A").unwrap();

        assert!(activity.covers(start.with_timezone(&Utc)));
        assert!(!activity.covers(end.with_timezone(&Utc)));
    }

    #[test]
    fn test_activity_state_parse() {
        assert_eq!(ActivityState::parse("active").unwrap(), ActivityState::Active);
        assert_eq!(ActivityState::parse("DONE").unwrap(), ActivityState::Done);
        assert!(ActivityState::parse("paused").is_err());
    }
}
