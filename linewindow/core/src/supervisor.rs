//! Session Supervisor
//!
//! The single authority over which [`StreamSession`] may publish. Every
//! [`SessionSupervisor::select`] supersedes the previous session before the
//! next one starts, so output from an old category can never surface after
//! the host switched to a new one.
//!
//! # Publication Gate
//!
//! ```text
//!   select(Y)                       session X task            session Y task
//!   ─────────                       ──────────────            ──────────────
//!   lock(active) ◄─────────────┐
//!   cancel X                   │    publish(X, ..)
//!   active = Y                 └──── lock(active)  (waits)
//!   spawn Y                                                   publish(Y, ..)
//!   unlock ──────────────────────►  active != X: drop          lock(active)
//!                                                             active == Y: deliver
//! ```
//!
//! The observer is invoked while the gate lock is held. A publish is
//! delivered only if the slot still names the publishing session and its
//! cancellation flag is clear; `select` swaps the slot under the same lock.
//! Once `select` returns no earlier session can deliver, whatever it still
//! had buffered.
//!
//! The gate is reentrant: an observer may call `select`, `cancel_active` or
//! `state` from inside a callback (for example to fall back to another
//! category after a failure). Those calls run on the callback's thread and
//! take effect before the callback returns.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};

use crate::category::Category;
use crate::error::StreamFailure;
use crate::observer::{FeedObserver, WindowUpdate};
use crate::session::{
    CancelHandle, SessionConfig, SessionHandle, SessionId, SessionOutcome, SessionSink,
    StreamSession,
};
use crate::source::ByteSource;
use crate::window::WindowSnapshot;

// ============================================================================
// State & Stats
// ============================================================================

/// What the supervisor is doing right now
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorState {
    /// No session is eligible to publish
    Idle,
    /// One session is eligible to publish
    Active {
        /// Generation id of the active session
        id: SessionId,
        /// Category it is bound to
        category: Category,
    },
}

/// Supervisor counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SupervisorStats {
    /// Sessions started by `select`
    pub sessions_started: u64,
    /// Sessions cancelled because another one replaced them
    pub sessions_superseded: u64,
    /// Window updates handed to the observer
    pub publishes_delivered: u64,
    /// Publishes refused because their session was no longer active
    pub publishes_suppressed: u64,
    /// Failures handed to the observer
    pub failures_reported: u64,
}

#[derive(Debug, Default)]
struct GateStats {
    sessions_started: AtomicU64,
    sessions_superseded: AtomicU64,
    publishes_delivered: AtomicU64,
    publishes_suppressed: AtomicU64,
    failures_reported: AtomicU64,
}

impl GateStats {
    fn snapshot(&self) -> SupervisorStats {
        SupervisorStats {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_superseded: self.sessions_superseded.load(Ordering::Relaxed),
            publishes_delivered: self.publishes_delivered.load(Ordering::Relaxed),
            publishes_suppressed: self.publishes_suppressed.load(Ordering::Relaxed),
            failures_reported: self.failures_reported.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Gate
// ============================================================================

#[derive(Debug)]
struct ActiveSlot {
    id: SessionId,
    category: Category,
    cancel: CancelHandle,
}

impl ActiveSlot {
    fn admits(&self, session: SessionId) -> bool {
        self.id == session && !self.cancel.is_cancelled()
    }
}

/// Shared between the supervisor and its sessions
///
/// `RefCell` borrows never span an observer call, so a callback that
/// re-enters the gate on the same thread can always borrow the slot.
struct PublishGate {
    active: ReentrantMutex<RefCell<Option<ActiveSlot>>>,
    observer: Arc<dyn FeedObserver>,
    stats: GateStats,
}

impl PublishGate {
    fn admits(slot: &RefCell<Option<ActiveSlot>>, session: SessionId) -> bool {
        slot.borrow()
            .as_ref()
            .is_some_and(|slot| slot.admits(session))
    }

    fn is_active(&self, session: SessionId) -> bool {
        Self::admits(&self.active.lock(), session)
    }

    fn take_active(&self) -> Option<ActiveSlot> {
        self.active.lock().borrow_mut().take()
    }
}

impl SessionSink for PublishGate {
    fn publish(&self, session: SessionId, category: Category, snapshot: WindowSnapshot) -> bool {
        let active = self.active.lock();

        if !Self::admits(&active, session) {
            self.stats.publishes_suppressed.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(session = %session, "Suppressed publish from inactive session");
            return false;
        }

        self.observer.on_window_update(&WindowUpdate {
            session,
            category,
            lines: snapshot,
        });
        self.stats.publishes_delivered.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn report_failure(&self, failure: StreamFailure) -> bool {
        let active = self.active.lock();

        if !Self::admits(&active, failure.session) {
            tracing::debug!(
                session = %failure.session,
                error = %failure,
                "Dropped failure from inactive session"
            );
            return false;
        }

        self.observer.on_stream_error(&failure);
        self.stats.failures_reported.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn retire(&self, session: SessionId, outcome: &SessionOutcome) {
        let active = self.active.lock();
        let mut slot = active.borrow_mut();

        if slot.as_ref().is_some_and(|slot| slot.id == session) {
            *slot = None;
            tracing::debug!(session = %session, outcome = outcome.label(), "Supervisor idle");
        }
    }
}

// ============================================================================
// Supervisor
// ============================================================================

/// Owns at most one publishing session at a time
pub struct SessionSupervisor<S: ByteSource + ?Sized + 'static> {
    source: Arc<S>,
    gate: Arc<PublishGate>,
    config: SessionConfig,
    /// Started sessions that may still be winding down
    sessions: Mutex<Vec<SessionHandle>>,
}

impl<S: ByteSource + ?Sized + 'static> SessionSupervisor<S> {
    /// Create an idle supervisor
    pub fn new(source: Arc<S>, observer: Arc<dyn FeedObserver>, config: SessionConfig) -> Self {
        Self {
            source,
            gate: Arc::new(PublishGate {
                active: ReentrantMutex::new(RefCell::new(None)),
                observer,
                stats: GateStats::default(),
            }),
            config,
            sessions: Mutex::new(Vec::new()),
        }
    }

    /// Supersede the active session (if any) and start one for `category`
    ///
    /// Selecting the category that is already active restarts it. When this
    /// returns, no earlier session can deliver anything to the observer.
    /// May be called from inside an observer callback.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn select(&self, category: Category) -> SessionId {
        let id = SessionId::next();
        let cancel = CancelHandle::new();

        let handle = {
            let active = self.gate.active.lock();
            let previous = active.borrow_mut().replace(ActiveSlot {
                id,
                category,
                cancel: cancel.clone(),
            });

            if let Some(previous) = previous {
                if previous.cancel.cancel() {
                    self.gate
                        .stats
                        .sessions_superseded
                        .fetch_add(1, Ordering::Relaxed);
                }
                tracing::debug!(
                    previous = %previous.id,
                    previous_category = %previous.category,
                    next = %id,
                    "Superseding session"
                );
            }

            let sink: Arc<dyn SessionSink> = self.gate.clone();
            StreamSession::start_with_cancel(
                id,
                category,
                Arc::clone(&self.source),
                &self.config,
                sink,
                cancel,
            )
        };

        self.gate
            .stats
            .sessions_started
            .fetch_add(1, Ordering::Relaxed);
        tracing::info!(session = %id, category = %category, source = self.source.name(), "Selected category");

        let mut sessions = self.sessions.lock();
        sessions.retain(|h| !h.is_finished());
        sessions.push(handle);

        id
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SupervisorState {
        let active = self.gate.active.lock();
        let slot = active.borrow();
        match slot.as_ref() {
            Some(slot) => SupervisorState::Active {
                id: slot.id,
                category: slot.category,
            },
            None => SupervisorState::Idle,
        }
    }

    /// Whether `session` is the one currently allowed to publish
    #[must_use]
    pub fn is_active(&self, session: SessionId) -> bool {
        self.gate.is_active(session)
    }

    /// Counter snapshot
    #[must_use]
    pub fn stats(&self) -> SupervisorStats {
        self.gate.stats.snapshot()
    }

    /// Window capacity and publish settings used for new sessions
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Cancel the active session without starting another
    ///
    /// Returns the cancelled session's id, if there was one.
    pub fn cancel_active(&self) -> Option<SessionId> {
        let slot = self.gate.take_active()?;
        slot.cancel.cancel();
        tracing::debug!(session = %slot.id, category = %slot.category, "Cancelled active session");
        Some(slot.id)
    }

    /// Cancel everything and wait until every session released its stream
    pub async fn shutdown(&self) {
        self.cancel_active();

        let sessions: Vec<SessionHandle> = std::mem::take(&mut *self.sessions.lock());
        let count = sessions.len();

        for handle in sessions {
            handle.cancel();
            let id = handle.id();
            let outcome = handle.join().await;
            tracing::trace!(session = %id, outcome = outcome.label(), "Session joined");
        }

        tracing::info!(sessions = count, "Supervisor shut down");
    }
}

impl<S: ByteSource + ?Sized + 'static> Drop for SessionSupervisor<S> {
    fn drop(&mut self) {
        if let Some(id) = self.cancel_active() {
            tracing::debug!(session = %id, "Supervisor dropped with an active session");
        }
        for handle in self.sessions.lock().iter() {
            handle.cancel();
        }
    }
}
