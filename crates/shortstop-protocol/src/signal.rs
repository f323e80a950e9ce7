//! Raw page observations forwarded by the browser bridge.
//!
//! These are the noisy inputs the view classifier de-duplicates. The
//! bridge forwards them as they happen; it does no classification of its
//! own.

use serde::{Deserialize, Serialize};

use shortstop_core::SHORT_FORM_PREFIX;

/// A single observation from the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageSignal {
    /// History navigation (pushState, replaceState, popstate).
    UrlChanged { path: String },

    /// The site's own in-page navigation finished.
    NavigateFinish { path: String },

    /// An `href` attribute changed somewhere in the document.
    DomMutation {
        /// New value of the mutated attribute
        href: String,
        /// `location.pathname` at the time of the mutation
        path: String,
    },

    /// Document visibility changed.
    VisibilityChanged { hidden: bool },

    /// The active item's media element was found.
    MediaAttached { playing: bool },

    /// The media element started or resumed playback.
    MediaPlay,

    /// The media element paused.
    MediaPause,

    /// The page is being torn down.
    Unload,
}

impl PageSignal {
    /// The location path this signal asks the classifier to re-check.
    ///
    /// DOM mutations only count when the mutated link points at a
    /// short-form item; most attribute churn on the page is unrelated.
    pub fn observed_path(&self) -> Option<&str> {
        match self {
            Self::UrlChanged { path } | Self::NavigateFinish { path } => Some(path),
            Self::DomMutation { href, path } if href.contains(SHORT_FORM_PREFIX) => Some(path),
            _ => None,
        }
    }

    /// Short name for log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Self::UrlChanged { .. } => "url_changed",
            Self::NavigateFinish { .. } => "navigate_finish",
            Self::DomMutation { .. } => "dom_mutation",
            Self::VisibilityChanged { .. } => "visibility_changed",
            Self::MediaAttached { .. } => "media_attached",
            Self::MediaPlay => "media_play",
            Self::MediaPause => "media_pause",
            Self::Unload => "unload",
        }
    }
}
