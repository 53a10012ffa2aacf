//! Topic Routing
//!
//! Maps push-channel topics to the event kind their payload carries.

use groundlink_types::EventKind;
use wildmatch::WildMatch;

use crate::config::TopicConfig;

/// Ordered topic pattern table; the first matching pattern wins
#[derive(Debug, Clone)]
pub struct TopicRoutes {
    routes: Vec<(String, WildMatch, EventKind)>,
}

impl TopicRoutes {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Build the table from configuration
    pub fn from_config(config: &TopicConfig) -> Self {
        let groups = [
            (EventKind::RegistryReplace, &config.registry_replace),
            (EventKind::ScheduleUpdate, &config.schedule_update),
            (EventKind::Removal, &config.removal),
            (EventKind::Patch, &config.patch),
        ];

        let mut routes = Self::new();
        for (kind, patterns) in groups {
            for pattern in patterns {
                routes = routes.with_route(pattern, kind);
            }
        }
        routes
    }

    /// Append a pattern for `kind`
    pub fn with_route(mut self, pattern: impl Into<String>, kind: EventKind) -> Self {
        let pattern = pattern.into();
        let matcher = WildMatch::new(&pattern);
        self.routes.push((pattern, matcher, kind));
        self
    }

    /// Event kind for a topic, if any pattern matches
    pub fn route(&self, topic: &str) -> Option<EventKind> {
        self.routes
            .iter()
            .find(|(pattern, matcher, _)| pattern == topic || matcher.matches(topic))
            .map(|(_, _, kind)| *kind)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Default for TopicRoutes {
    fn default() -> Self {
        Self::from_config(&TopicConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_routes() {
        let routes = TopicRoutes::default();

        assert_eq!(routes.route("client_data_update"), Some(EventKind::RegistryReplace));
        assert_eq!(routes.route("field_unit_data"), Some(EventKind::Patch));
        assert_eq!(routes.route("az_el_result"), Some(EventKind::Patch));
        assert_eq!(routes.route("schedule/update"), Some(EventKind::ScheduleUpdate));
        assert_eq!(routes.route("unit_removed"), Some(EventKind::Removal));
        assert_eq!(routes.route("log_update"), None);
    }

    #[test]
    fn test_wildcards_and_precedence() {
        let config = TopicConfig {
            registry_replace: vec!["units/all".to_string()],
            patch: vec!["units/*".to_string()],
            schedule_update: vec!["sched?".to_string()],
            removal: Vec::new(),
        };
        let routes = TopicRoutes::from_config(&config);

        // registry patterns are checked before the broader patch wildcard
        assert_eq!(routes.route("units/all"), Some(EventKind::RegistryReplace));
        assert_eq!(routes.route("units/FU1"), Some(EventKind::Patch));
        assert_eq!(routes.route("sched1"), Some(EventKind::ScheduleUpdate));
        assert_eq!(routes.route("sched12"), None);
        assert_eq!(routes.len(), 3);
    }
}
