//! Threshold-crossing intents.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Daily watch time, in seconds, that raises a time intervention.
pub const TIME_THRESHOLD_SECS: u64 = 180;

/// Notification title shown for every intervention.
pub const NOTIFICATION_TITLE: &str = "YouTube Shorts Limit Reached";

/// Which threshold was crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionKind {
    /// Session item count reached the redirect threshold.
    Count,
    /// Accumulated watch time reached [`TIME_THRESHOLD_SECS`].
    Time,
}

impl fmt::Display for InterventionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count => write!(f, "count"),
            Self::Time => write!(f, "time"),
        }
    }
}

/// Signal that a threshold was crossed.
///
/// Carries everything a host surface needs to act on it: what to tell the
/// user and, when redirects are enabled, where to send the active tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intervention {
    pub kind: InterventionKind,
    /// The threshold value that was crossed (items or seconds).
    pub threshold: u64,
    /// Redirect target, present only when redirects are enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

impl Intervention {
    pub fn count(threshold: u32, redirect_url: Option<String>) -> Self {
        Self {
            kind: InterventionKind::Count,
            threshold: u64::from(threshold),
            redirect_url,
        }
    }

    pub fn time(redirect_url: Option<String>) -> Self {
        Self {
            kind: InterventionKind::Time,
            threshold: TIME_THRESHOLD_SECS,
            redirect_url,
        }
    }

    pub fn title(&self) -> &'static str {
        NOTIFICATION_TITLE
    }

    /// Notification body text.
    pub fn message(&self) -> String {
        match self.kind {
            InterventionKind::Count => format!(
                "You have watched {} Shorts today! Consider taking a break.",
                self.threshold
            ),
            InterventionKind::Time => format!(
                "You have spent {} minutes watching Shorts today! Consider taking a break.",
                self.threshold / 60
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let count = Intervention::count(5, None);
        assert_eq!(
            count.message(),
            "You have watched 5 Shorts today! Consider taking a break."
        );

        let time = Intervention::time(Some("https://example.com".to_string()));
        assert_eq!(
            time.message(),
            "You have spent 3 minutes watching Shorts today! Consider taking a break."
        );
        assert_eq!(time.title(), NOTIFICATION_TITLE);
    }

    #[test]
    fn test_serialization_omits_missing_redirect() {
        let json = serde_json::to_string(&Intervention::count(7, None)).unwrap();
        assert!(json.contains("\"kind\":\"count\""));
        assert!(!json.contains("redirect_url"));
    }
}
