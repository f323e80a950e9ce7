//! Redirect settings and their validation.

use serde::{Deserialize, Serialize};

use crate::day::DayKey;
use crate::error::{DomainError, DomainResult};

/// Session item count that triggers a count intervention when unset.
pub const DEFAULT_REDIRECT_THRESHOLD: u32 = 5;

/// Smallest accepted redirect threshold.
pub const MIN_REDIRECT_THRESHOLD: u32 = 1;

/// Largest accepted redirect threshold.
pub const MAX_REDIRECT_THRESHOLD: u32 = 100;

/// Where the active tab goes when no custom URL is set.
pub const DEFAULT_REDIRECT_URL: &str = "https://www.reddit.com/r/GetDisciplined";

/// Persisted user settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub redirect_enabled: bool,
    pub redirect_threshold: u32,
    pub time_based_redirect_enabled: bool,
    pub custom_redirect_url: String,
    /// Day of the most recent session start; `None` before the first one.
    pub last_active_date: Option<DayKey>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            redirect_enabled: false,
            redirect_threshold: DEFAULT_REDIRECT_THRESHOLD,
            time_based_redirect_enabled: false,
            custom_redirect_url: DEFAULT_REDIRECT_URL.to_string(),
            last_active_date: None,
        }
    }
}

impl Settings {
    /// Validates a threshold coming from a form or the CLI.
    pub fn validate_threshold(value: i64) -> DomainResult<u32> {
        u32::try_from(value)
            .ok()
            .filter(|v| (MIN_REDIRECT_THRESHOLD..=MAX_REDIRECT_THRESHOLD).contains(v))
            .ok_or(DomainError::InvalidThreshold {
                value,
                min: MIN_REDIRECT_THRESHOLD,
                max: MAX_REDIRECT_THRESHOLD,
            })
    }

    /// Validates a redirect URL, returning it trimmed.
    pub fn validate_redirect_url(value: &str) -> DomainResult<String> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DomainError::EmptyRedirectUrl);
        }
        Ok(trimmed.to_string())
    }

    /// The URL a redirect should open.
    pub fn redirect_url(&self) -> &str {
        if self.custom_redirect_url.trim().is_empty() {
            DEFAULT_REDIRECT_URL
        } else {
            &self.custom_redirect_url
        }
    }
}

/// A partial settings change. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_threshold: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_based_redirect_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_redirect_url: Option<String>,
    /// Restore the default redirect URL (wins over `custom_redirect_url`).
    #[serde(default)]
    pub reset_url: bool,
}

impl SettingsUpdate {
    /// Applies the valid parts of this update to `settings`.
    ///
    /// Invalid fields are skipped and reported; the rest still apply, the
    /// same way a settings form ignores an out-of-range number input.
    pub fn apply(&self, settings: &mut Settings) -> Vec<DomainError> {
        let mut rejected = Vec::new();

        if let Some(enabled) = self.redirect_enabled {
            settings.redirect_enabled = enabled;
        }
        if let Some(value) = self.redirect_threshold {
            match Settings::validate_threshold(value) {
                Ok(threshold) => settings.redirect_threshold = threshold,
                Err(err) => rejected.push(err),
            }
        }
        if let Some(enabled) = self.time_based_redirect_enabled {
            settings.time_based_redirect_enabled = enabled;
        }
        if self.reset_url {
            settings.custom_redirect_url = DEFAULT_REDIRECT_URL.to_string();
        } else if let Some(url) = &self.custom_redirect_url {
            match Settings::validate_redirect_url(url) {
                Ok(url) => settings.custom_redirect_url = url,
                Err(err) => rejected.push(err),
            }
        }

        rejected
    }

    /// True if the update carries no changes.
    pub fn is_empty(&self) -> bool {
        self.redirect_enabled.is_none()
            && self.redirect_threshold.is_none()
            && self.time_based_redirect_enabled.is_none()
            && self.custom_redirect_url.is_none()
            && !self.reset_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_bounds() {
        assert_eq!(Settings::validate_threshold(1), Ok(1));
        assert_eq!(Settings::validate_threshold(100), Ok(100));
        assert!(Settings::validate_threshold(0).is_err());
        assert!(Settings::validate_threshold(101).is_err());
        assert!(Settings::validate_threshold(-3).is_err());
    }

    #[test]
    fn test_update_skips_invalid_fields_but_applies_the_rest() {
        let mut settings = Settings::default();
        let update = SettingsUpdate {
            redirect_enabled: Some(true),
            redirect_threshold: Some(500),
            custom_redirect_url: Some("   ".to_string()),
            ..Default::default()
        };

        let rejected = update.apply(&mut settings);

        assert_eq!(rejected.len(), 2);
        assert!(settings.redirect_enabled);
        assert_eq!(settings.redirect_threshold, DEFAULT_REDIRECT_THRESHOLD);
        assert_eq!(settings.custom_redirect_url, DEFAULT_REDIRECT_URL);
    }

    #[test]
    fn test_reset_url_restores_default() {
        let mut settings = Settings {
            custom_redirect_url: "https://example.com".to_string(),
            ..Default::default()
        };
        let update = SettingsUpdate {
            custom_redirect_url: Some("https://ignored.example".to_string()),
            reset_url: true,
            ..Default::default()
        };
        assert!(update.apply(&mut settings).is_empty());
        assert_eq!(settings.custom_redirect_url, DEFAULT_REDIRECT_URL);
    }

    #[test]
    fn test_redirect_url_falls_back_when_blank() {
        let settings = Settings {
            custom_redirect_url: String::new(),
            ..Default::default()
        };
        assert_eq!(settings.redirect_url(), DEFAULT_REDIRECT_URL);
    }
}
