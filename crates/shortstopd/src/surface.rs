//! Host surfaces: badge, notification, popup and redirect.
//!
//! The daemon never renders anything itself. It asks a [`HostSurface`] to
//! act and carries on whatever the outcome; a failed notification or a
//! missing tab is logged, never propagated.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - Every surface error is logged and swallowed by the dispatcher

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use shortstop_core::Intervention;

use crate::aggregator::DaemonEvent;

// ============================================================================
// Surface Contract
// ============================================================================

/// Errors a host surface can report.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SurfaceError {
    /// The user has not granted notification permission.
    #[error("notification permission denied")]
    PermissionDenied,

    /// Nothing is listening on the other side.
    #[error("surface unavailable: {0}")]
    Unavailable(String),

    /// There is no active tab to redirect.
    #[error("no active tab")]
    NoActiveTab,
}

/// Side effects the daemon can request from the browser.
#[async_trait]
pub trait HostSurface: Send + Sync {
    /// Sets the badge text; `""` clears it.
    async fn set_badge(&self, text: &str) -> Result<(), SurfaceError>;

    /// Shows a system notification.
    async fn notify(&self, title: &str, message: &str) -> Result<(), SurfaceError>;

    /// Opens the extension popup.
    async fn open_popup(&self) -> Result<(), SurfaceError>;

    /// Navigates the active tab to `url`.
    async fn redirect_active_tab(&self, url: &str) -> Result<(), SurfaceError>;
}

// ============================================================================
// Intervention Dispatcher
// ============================================================================

/// Carries out an intervention against a surface.
///
/// Order is fixed: notification, popup, then redirect. Each step runs
/// regardless of how the previous one went.
#[derive(Clone)]
pub struct InterventionDispatcher {
    surface: Arc<dyn HostSurface>,
}

impl InterventionDispatcher {
    pub fn new(surface: Arc<dyn HostSurface>) -> Self {
        Self { surface }
    }

    pub async fn dispatch(&self, intervention: &Intervention) {
        info!(
            kind = %intervention.kind,
            threshold = intervention.threshold,
            redirect = intervention.redirect_url.is_some(),
            "Dispatching intervention"
        );

        match self
            .surface
            .notify(intervention.title(), &intervention.message())
            .await
        {
            Ok(()) => {}
            Err(SurfaceError::PermissionDenied) => {
                debug!("Notification permission denied, continuing without it");
            }
            Err(e) => warn!(error = %e, "Failed to show intervention notification"),
        }

        if let Err(e) = self.surface.open_popup().await {
            debug!(error = %e, "Could not open popup");
        }

        if let Some(url) = &intervention.redirect_url {
            if let Err(e) = self.surface.redirect_active_tab(url).await {
                warn!(url = %url, error = %e, "Failed to redirect active tab");
            }
        }
    }

    /// Sets the badge, logging failure.
    pub async fn set_badge(&self, text: &str) {
        if let Err(e) = self.surface.set_badge(text).await {
            debug!(text, error = %e, "Failed to update badge");
        }
    }
}

// ============================================================================
// Broadcast Surface
// ============================================================================

/// Surface that publishes each request to subscribed bridge clients.
pub struct BroadcastSurface {
    events: broadcast::Sender<DaemonEvent>,
    notifications_enabled: bool,
}

impl BroadcastSurface {
    pub fn new(events: broadcast::Sender<DaemonEvent>, notifications_enabled: bool) -> Self {
        Self {
            events,
            notifications_enabled,
        }
    }

    fn publish(&self, event: DaemonEvent) -> Result<(), SurfaceError> {
        self.events
            .send(event)
            .map(|_| ())
            .map_err(|_| SurfaceError::Unavailable("no subscribed clients".to_string()))
    }
}

#[async_trait]
impl HostSurface for BroadcastSurface {
    async fn set_badge(&self, text: &str) -> Result<(), SurfaceError> {
        // The badge is state, not an action; nobody listening is fine
        let _ = self.events.send(DaemonEvent::Badge {
            text: text.to_string(),
        });
        Ok(())
    }

    async fn notify(&self, title: &str, message: &str) -> Result<(), SurfaceError> {
        if !self.notifications_enabled {
            return Err(SurfaceError::PermissionDenied);
        }
        self.publish(DaemonEvent::Notify {
            title: title.to_string(),
            message: message.to_string(),
        })
    }

    async fn open_popup(&self) -> Result<(), SurfaceError> {
        self.publish(DaemonEvent::OpenPopup)
    }

    async fn redirect_active_tab(&self, url: &str) -> Result<(), SurfaceError> {
        self.publish(DaemonEvent::Redirect {
            url: url.to_string(),
        })
        .map_err(|_| SurfaceError::NoActiveTab)
    }
}

// ============================================================================
// Recording Surface
// ============================================================================

/// One request made to a [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    Badge(String),
    Notify { title: String, message: String },
    OpenPopup,
    Redirect(String),
}

/// Surface that records every call; for tests and dry runs.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    calls: Mutex<Vec<SurfaceCall>>,
    deny_notifications: bool,
    fail_popup: bool,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports `PermissionDenied` for every notification.
    #[must_use]
    pub fn denying_notifications(mut self) -> Self {
        self.deny_notifications = true;
        self
    }

    /// Reports `Unavailable` for every popup request.
    #[must_use]
    pub fn failing_popup(mut self) -> Self {
        self.fail_popup = true;
        self
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        match self.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// The most recent badge text, if any was set.
    pub fn last_badge(&self) -> Option<String> {
        self.calls().into_iter().rev().find_map(|call| match call {
            SurfaceCall::Badge(text) => Some(text),
            _ => None,
        })
    }

    fn record(&self, call: SurfaceCall) {
        match self.calls.lock() {
            Ok(mut calls) => calls.push(call),
            Err(poisoned) => poisoned.into_inner().push(call),
        }
    }
}

#[async_trait]
impl HostSurface for RecordingSurface {
    async fn set_badge(&self, text: &str) -> Result<(), SurfaceError> {
        self.record(SurfaceCall::Badge(text.to_string()));
        Ok(())
    }

    async fn notify(&self, title: &str, message: &str) -> Result<(), SurfaceError> {
        if self.deny_notifications {
            return Err(SurfaceError::PermissionDenied);
        }
        self.record(SurfaceCall::Notify {
            title: title.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }

    async fn open_popup(&self) -> Result<(), SurfaceError> {
        if self.fail_popup {
            return Err(SurfaceError::Unavailable("popup".to_string()));
        }
        self.record(SurfaceCall::OpenPopup);
        Ok(())
    }

    async fn redirect_active_tab(&self, url: &str) -> Result<(), SurfaceError> {
        self.record(SurfaceCall::Redirect(url.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dispatch_order_with_redirect() {
        let surface = Arc::new(RecordingSurface::new());
        let dispatcher = InterventionDispatcher::new(surface.clone());

        let intervention = Intervention::count(5, Some("https://example.com".to_string()));
        dispatcher.dispatch(&intervention).await;

        let calls = surface.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(calls[0], SurfaceCall::Notify { .. }));
        assert_eq!(calls[1], SurfaceCall::OpenPopup);
        assert_eq!(calls[2], SurfaceCall::Redirect("https://example.com".to_string()));
    }

    #[tokio::test]
    async fn test_denied_notification_still_redirects() {
        let surface = Arc::new(RecordingSurface::new().denying_notifications().failing_popup());
        let dispatcher = InterventionDispatcher::new(surface.clone());

        dispatcher
            .dispatch(&Intervention::time(Some("https://example.com".to_string())))
            .await;

        assert_eq!(
            surface.calls(),
            vec![SurfaceCall::Redirect("https://example.com".to_string())]
        );
    }

    #[tokio::test]
    async fn test_no_redirect_without_url() {
        let surface = Arc::new(RecordingSurface::new());
        let dispatcher = InterventionDispatcher::new(surface.clone());

        dispatcher.dispatch(&Intervention::time(None)).await;

        assert!(!surface
            .calls()
            .iter()
            .any(|call| matches!(call, SurfaceCall::Redirect(_))));
    }

    #[tokio::test]
    async fn test_broadcast_surface_respects_disabled_notifications() {
        let (tx, mut rx) = broadcast::channel(8);
        let surface = BroadcastSurface::new(tx, false);

        assert_eq!(
            surface.notify("t", "m").await,
            Err(SurfaceError::PermissionDenied)
        );
        surface.redirect_active_tab("https://example.com").await.unwrap();

        assert!(matches!(rx.recv().await.unwrap(), DaemonEvent::Redirect { .. }));
    }
}
