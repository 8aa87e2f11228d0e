//! Request path registration.
//!
//! This module provides the `Registry` which maps exact request paths to
//! event handlers and media files. The tables can be changed at any time,
//! including while a request is being dispatched; the last registration for
//! a path wins.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use upnp_parser::{ChangeInstance, PropertySet};

use crate::media::MediaEntry;

/// A parsed GENA NOTIFY request.
#[derive(Debug, Clone)]
pub struct EventNotification {
    /// Request path the notification arrived on
    pub path: String,
    /// Subscription identifier from the `SID` header
    pub sid: String,
    /// Event key from the `SEQ` header
    pub seq: Option<u32>,
    /// Decoded LastChange instances, empty for services that do not use LastChange
    pub changes: Vec<ChangeInstance>,
    /// All evented variables as sent
    pub property_set: PropertySet,
    /// Raw request body
    pub body: String,
}

/// Receiver of notifications for one registered path.
///
/// Handlers run inside the dispatch loop: the next request is not processed
/// until `handle_event` returns.
pub trait EventHandler: Send + Sync + 'static {
    fn handle_event(&self, notification: EventNotification);
}

impl<F> EventHandler for F
where
    F: Fn(EventNotification) + Send + Sync + 'static,
{
    fn handle_event(&self, notification: EventNotification) {
        self(notification)
    }
}

impl EventHandler for mpsc::UnboundedSender<EventNotification> {
    fn handle_event(&self, notification: EventNotification) {
        if self.send(notification).is_err() {
            tracing::debug!("event receiver dropped, notification discarded");
        }
    }
}

/// Result of looking up a request path
#[derive(Clone)]
pub(crate) enum Route {
    Event(Arc<dyn EventHandler>),
    Media(MediaEntry),
}

/// Path tables shared between the server handle and the dispatch loop.
#[derive(Clone, Default)]
pub struct Registry {
    events: Arc<RwLock<HashMap<String, Arc<dyn EventHandler>>>>,
    media: Arc<RwLock<HashMap<String, MediaEntry>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route notifications arriving on `path` to `handler`, replacing any
    /// previous handler for that path.
    pub async fn register_event_handler(&self, path: &str, handler: impl EventHandler) {
        let path = normalize_path(path);
        let mut events = self.events.write().await;
        if events.insert(path.clone(), Arc::new(handler)).is_some() {
            tracing::debug!("replaced event handler for {}", path);
        }
    }

    /// Returns false if nothing was registered for `path`
    pub async fn unregister_event_handler(&self, path: &str) -> bool {
        let mut events = self.events.write().await;
        events.remove(&normalize_path(path)).is_some()
    }

    pub async fn has_event_handler(&self, path: &str) -> bool {
        self.events.read().await.contains_key(&normalize_path(path))
    }

    pub(crate) async fn insert_media(&self, path: &str, entry: MediaEntry) {
        let mut media = self.media.write().await;
        media.insert(normalize_path(path), entry);
    }

    pub(crate) async fn remove_media(&self, path: &str) -> bool {
        let mut media = self.media.write().await;
        media.remove(&normalize_path(path)).is_some()
    }

    /// Event handlers take precedence over media entries on the same path.
    pub(crate) async fn route(&self, path: &str) -> Option<Route> {
        if let Some(handler) = self.events.read().await.get(path) {
            return Some(Route::Event(Arc::clone(handler)));
        }
        self.media.read().await.get(path).cloned().map(Route::Media)
    }
}

/// Paths are matched exactly; only a missing leading slash is added.
pub(crate) fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
