//! Failures reported by the dispatch loop.
//!
//! Nothing the loop encounters is fatal to it. Every problem is turned into a
//! [`DispatchFailure`] on the failure channel and the loop moves on.

use std::fmt;
use std::net::SocketAddr;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// No handler or media entry is registered for the request path, or the
    /// request body could not be read
    Unhandled,
    /// The listener stopped without being asked to
    ListenerBroken,
    /// A notification could not be validated or parsed
    EventAnalyzeFailed,
    /// An event handler panicked while handling a notification
    HandlerFailed,
    /// Opening, seeking or streaming a media file failed
    MediaTransportFailed,
}

impl FailureKind {
    /// True when the failure concerns the listener itself rather than one request
    pub fn is_listener_level(&self) -> bool {
        matches!(self, FailureKind::ListenerBroken)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Unhandled => "unhandled request",
            FailureKind::ListenerBroken => "listener broken",
            FailureKind::EventAnalyzeFailed => "event analysis failed",
            FailureKind::HandlerFailed => "event handler failed",
            FailureKind::MediaTransportFailed => "media transport failed",
        };
        f.write_str(name)
    }
}

/// The request a failure belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSummary {
    pub method: String,
    pub path: String,
    pub remote: Option<SocketAddr>,
}

#[derive(Debug, Clone)]
pub struct DispatchFailure {
    pub kind: FailureKind,
    /// `None` for listener-level failures
    pub request: Option<RequestSummary>,
    pub error: String,
}

impl fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.request {
            Some(request) => write!(
                f,
                "{} for {} {}: {}",
                self.kind, request.method, request.path, self.error
            ),
            None => write!(f, "{}: {}", self.kind, self.error),
        }
    }
}

/// Sends failures to the owner and mirrors them into the log.
#[derive(Debug, Clone)]
pub(crate) struct FailureReporter {
    tx: mpsc::UnboundedSender<DispatchFailure>,
}

impl FailureReporter {
    pub(crate) fn new(tx: mpsc::UnboundedSender<DispatchFailure>) -> Self {
        Self { tx }
    }

    pub(crate) fn report(
        &self,
        kind: FailureKind,
        request: Option<RequestSummary>,
        error: impl Into<String>,
    ) {
        let failure = DispatchFailure {
            kind,
            request,
            error: error.into(),
        };
        if kind.is_listener_level() {
            tracing::error!("{}", failure);
        } else {
            tracing::warn!("{}", failure);
        }
        // Receiver may be gone; the failure has been logged either way.
        let _ = self.tx.send(failure);
    }
}
