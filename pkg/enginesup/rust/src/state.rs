// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use serde::Serialize;
use std::fmt;

/// Aggregate engine status as seen by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Not running, or never verified.
    #[default]
    Offline,
    /// A `start` is in flight. Only one may hold this phase at a time.
    Starting,
    /// Verified as serving traffic.
    Online,
}

impl Phase {
    pub fn is_online(self) -> bool {
        self == Phase::Online
    }

    pub(crate) fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Offline, Starting)
                | (Online, Starting)
                | (Starting, Online)
                | (Starting, Offline)
                | (Online, Offline)
                | (Offline, Offline)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Offline => write!(f, "offline"),
            Phase::Starting => write!(f, "starting"),
            Phase::Online => write!(f, "online"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_offline() {
        assert_eq!(Phase::default(), Phase::Offline);
    }

    #[test]
    fn test_starting_is_only_entered_from_stable_phases() {
        assert!(Phase::Offline.can_transition_to(Phase::Starting));
        assert!(Phase::Online.can_transition_to(Phase::Starting));
        assert!(!Phase::Starting.can_transition_to(Phase::Starting));
    }

    #[test]
    fn test_online_requires_starting() {
        assert!(!Phase::Offline.can_transition_to(Phase::Online));
        assert!(Phase::Starting.can_transition_to(Phase::Online));
    }

    #[test]
    fn test_display() {
        assert_eq!(Phase::Online.to_string(), "online");
        assert_eq!(Phase::Starting.to_string(), "starting");
        assert_eq!(Phase::Offline.to_string(), "offline");
    }
}
