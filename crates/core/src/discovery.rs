// SPDX-FileCopyrightText: © 2025 RouteKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Discovery filter policy.
//!
//! Pure functions over a finder snapshot. Two filters exist: the general
//! source list (which must never report our own destinations back to the
//! operator) and the studio-monitor list (substring match on the name).

use crate::sdk::DiscoveredSource;
use crate::types::Source;

/// Substring identifying a studio monitor source, compared ASCII
/// case-insensitively.
const STUDIO_MONITOR_MARKER: &str = "studio monitor";

/// Filters a finder snapshot down to routable sources: nonempty names that
/// do not collide with any of our own destination names.
#[must_use]
pub fn filter_sources(snapshot: Vec<DiscoveredSource>, destination_names: &[String]) -> Vec<Source> {
    snapshot
        .into_iter()
        .filter(|s| !s.name.is_empty() && !destination_names.iter().any(|d| d == &s.name))
        .map(into_source)
        .collect()
}

/// Filters a finder snapshot down to studio monitors.
#[must_use]
pub fn filter_studio_monitors(snapshot: Vec<DiscoveredSource>) -> Vec<Source> {
    snapshot
        .into_iter()
        .filter(|s| !s.name.is_empty() && is_studio_monitor(&s.name))
        .map(into_source)
        .collect()
}

/// True when `name` contains `"studio monitor"`, ignoring ASCII case.
#[must_use]
pub fn is_studio_monitor(name: &str) -> bool {
    name.to_ascii_lowercase().contains(STUDIO_MONITOR_MARKER)
}

fn into_source(s: DiscoveredSource) -> Source {
    Source { name: s.name, url: s.url, connected: true, group: String::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(names: &[&str]) -> Vec<DiscoveredSource> {
        names
            .iter()
            .map(|n| DiscoveredSource { name: (*n).to_string(), url: String::new() })
            .collect()
    }

    #[test]
    fn excludes_own_destinations_and_empty_names() {
        let destinations = vec!["NDI Output 1".to_string(), "NDI Output 2".to_string()];
        let sources =
            filter_sources(snapshot(&["CAM1", "", "NDI Output 1", "CAM2"]), &destinations);

        let names: Vec<&str> = sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["CAM1", "CAM2"]);
        assert!(sources.iter().all(|s| s.connected));
    }

    #[test]
    fn studio_monitor_match_is_ascii_case_insensitive() {
        assert!(is_studio_monitor("OBS Studio Monitor 1"));
        assert!(is_studio_monitor("desk (STUDIO MONITOR)"));
        assert!(is_studio_monitor("studio monitor"));
        assert!(!is_studio_monitor("Studio  Monitor")); // double space: no match
        assert!(!is_studio_monitor("CAM1"));
    }

    #[test]
    fn studio_monitor_filter() {
        let monitors =
            filter_studio_monitors(snapshot(&["CAM1", "Desk (Studio Monitor)", "studio monitors"]));
        let names: Vec<&str> = monitors.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Desk (Studio Monitor)", "studio monitors"]);
    }
}
