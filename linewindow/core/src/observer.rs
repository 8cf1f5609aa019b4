//! Outbound Interface
//!
//! The host receives controller output through a [`FeedObserver`]. Calls are
//! made from session tasks while the supervisor's publication gate is held,
//! which is what guarantees that a superseded session can never deliver
//! after `select` returns. Observers should return quickly; they may call
//! back into the supervisor (`select`, `cancel_active`, `state`) from the
//! callback's thread.
//!
//! Hosts that prefer an async event loop can use [`ChannelObserver`], which
//! forwards every callback as a [`FeedEvent`].

use serde::Serialize;
use tokio::sync::mpsc;

use crate::category::Category;
use crate::error::StreamFailure;
use crate::session::SessionId;
use crate::window::{Line, WindowSnapshot};

/// A published window state of the active session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowUpdate {
    /// Session that produced the window
    pub session: SessionId,
    /// Category of that session
    pub category: Category,
    /// Window contents, oldest first
    pub lines: WindowSnapshot,
}

impl Serialize for WindowUpdate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            session: SessionId,
            category: Category,
            lines: &'a [Line],
        }

        Wire {
            session: self.session,
            category: self.category,
            lines: self.lines.lines(),
        }
        .serialize(serializer)
    }
}

/// Receiver of controller output
pub trait FeedObserver: Send + Sync {
    /// The active session's window changed
    fn on_window_update(&self, update: &WindowUpdate);

    /// The active session failed (at most once per session)
    fn on_stream_error(&self, failure: &StreamFailure) {
        let _ = failure;
    }
}

/// Observer output as a single event type
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FeedEvent {
    /// See [`FeedObserver::on_window_update`]
    Window(WindowUpdate),
    /// See [`FeedObserver::on_stream_error`]
    Error(StreamFailure),
}

impl FeedEvent {
    /// Session the event belongs to
    #[must_use]
    pub fn session(&self) -> SessionId {
        match self {
            Self::Window(update) => update.session,
            Self::Error(failure) => failure.session,
        }
    }
}

/// Forwards observer callbacks into an unbounded channel
///
/// Events are enqueued in delivery order. An event that was delivered
/// before a supersession may still be sitting in the channel afterwards;
/// hosts that need strict filtering compare [`FeedEvent::session`] against
/// `SessionSupervisor::is_active`.
#[derive(Clone, Debug)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<FeedEvent>,
}

impl ChannelObserver {
    /// Create an observer and the receiver its events arrive on
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FeedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: FeedEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Feed event receiver dropped");
        }
    }
}

impl FeedObserver for ChannelObserver {
    fn on_window_update(&self, update: &WindowUpdate) {
        self.forward(FeedEvent::Window(update.clone()));
    }

    fn on_stream_error(&self, failure: &StreamFailure) {
        self.forward(FeedEvent::Error(failure.clone()));
    }
}
