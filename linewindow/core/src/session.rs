//! Stream Sessions
//!
//! A session is one cancellable consumption lifecycle bound to a single
//! [`Category`]. It opens a byte stream, decodes it into lines, keeps the
//! most recent lines in its own [`LineWindow`], and hands window snapshots
//! to a [`SessionSink`] for publication.
//!
//! # Lifecycle
//!
//! ```text
//!  start ──► open ──► read ─┬─► decode ─► push ─► publish ─┐
//!              │            │                              │
//!              │            ◄──────────────────────────────┘
//!              │            ├─► end-of-stream ─► flush ─► Completed
//!              │            ├─► read/decode error ──────► Failed(MidStream)
//!              └─► error ───┼──────────────────────────► Failed(Open)
//!                           └─► cancel() ──────────────► Cancelled
//! ```
//!
//! # Cancellation
//!
//! [`CancelHandle::cancel`] flips a flag and wakes the session even while it
//! is suspended in the middle of a read, because every read races the
//! cancellation signal. The flag is checked again after every await point,
//! so a chunk that resolved concurrently with the cancel is discarded. On
//! return the stream is dropped, which releases the transport.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::category::Category;
use crate::decoder::{is_blank, DecoderOptions, LineDecoder};
use crate::error::{FailureKind, SessionError, StreamFailure};
use crate::source::{ByteSource, ByteStream};
use crate::window::{Line, LineWindow, WindowSnapshot, DEFAULT_WINDOW_CAPACITY};

// ============================================================================
// Identity
// ============================================================================

/// Unique, monotonically increasing session generation id
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// Allocate the next generation id
    #[must_use]
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Wrap a raw id (for hosts that persist or transmit ids)
    #[must_use]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw generation number
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

// ============================================================================
// Cancellation
// ============================================================================

#[derive(Debug)]
struct CancelState {
    cancelled: AtomicBool,
    signal: watch::Sender<bool>,
}

/// Cooperative, idempotent cancellation for one session
#[derive(Clone, Debug)]
pub struct CancelHandle {
    state: Arc<CancelState>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    /// Create an un-cancelled handle
    #[must_use]
    pub fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            state: Arc::new(CancelState {
                cancelled: AtomicBool::new(false),
                signal,
            }),
        }
    }

    /// Request cancellation
    ///
    /// Returns true only for the call that actually cancelled; repeated
    /// calls are no-ops.
    pub fn cancel(&self) -> bool {
        if self.state.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.state.signal.send_replace(true);
        true
    }

    /// Whether cancellation has been requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Resolve once cancellation is requested (immediately if it already was)
    pub async fn cancelled(&self) {
        let mut rx = self.state.signal.subscribe();
        // The sender lives in `state`, which `self` keeps alive
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// When a session hands its window to the sink
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishMode {
    /// Once per added line (default)
    #[default]
    PerLine,
    /// Once per chunk that added at least one line
    PerChunk,
}

impl std::str::FromStr for PublishMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "per_chunk" | "chunk" => Ok(Self::PerChunk),
            "per_line" | "line" => Ok(Self::PerLine),
            other => Err(format!("unknown publish mode '{other}' (expected per_chunk or per_line)")),
        }
    }
}

/// Per-session tuning
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Lines kept in the window
    pub window_capacity: usize,
    /// Publication granularity
    pub publish_mode: PublishMode,
    /// Decoder options
    pub decoder: DecoderOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            publish_mode: PublishMode::PerLine,
            decoder: DecoderOptions::default(),
        }
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Counters for one session
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Chunks received
    pub chunks: u64,
    /// Bytes received
    pub bytes: u64,
    /// Non-blank lines pushed into the window
    pub lines: u64,
    /// Snapshots accepted by the sink
    pub publishes: u64,
    /// Lines evicted from the window
    pub evicted: u64,
    /// Time from start to retirement
    pub duration: Duration,
}

/// How a session ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The stream reached its end
    Completed(SessionStats),
    /// Cancellation was requested (superseded or torn down)
    Cancelled(SessionStats),
    /// The stream failed
    Failed(FailureKind, SessionStats),
}

impl SessionOutcome {
    /// Counters of the finished session
    #[must_use]
    pub fn stats(&self) -> &SessionStats {
        match self {
            Self::Completed(stats) | Self::Cancelled(stats) | Self::Failed(_, stats) => stats,
        }
    }

    /// Short label for logs
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::Cancelled(_) => "cancelled",
            Self::Failed(FailureKind::Open, _) => "failed to open",
            Self::Failed(FailureKind::MidStream, _) => "failed mid-stream",
        }
    }
}

// ============================================================================
// Sink
// ============================================================================

/// Where a session delivers its output
///
/// Implemented by the supervisor, which decides whether the session is
/// still allowed to publish.
pub trait SessionSink: Send + Sync {
    /// Offer a window snapshot; returns whether it was delivered
    fn publish(&self, session: SessionId, category: Category, snapshot: WindowSnapshot) -> bool;

    /// Report a terminal failure; returns whether it was delivered
    fn report_failure(&self, failure: StreamFailure) -> bool;

    /// The session has finished and released its stream
    fn retire(&self, session: SessionId, outcome: &SessionOutcome);
}

// ============================================================================
// Session
// ============================================================================

/// Handle to a running session
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    category: Category,
    cancel: CancelHandle,
    task: JoinHandle<SessionOutcome>,
}

impl SessionHandle {
    /// Generation id
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Bound category
    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    /// Request cancellation (idempotent)
    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }

    /// Whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the session task has finished
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session to finish and release its stream
    pub async fn join(self) -> SessionOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(session = %self.id, error = %e, "Session task did not finish cleanly");
                SessionOutcome::Cancelled(SessionStats::default())
            }
        }
    }
}

/// One stream consumption lifecycle
pub struct StreamSession<S: ?Sized> {
    id: SessionId,
    category: Category,
    source: Arc<S>,
    sink: Arc<dyn SessionSink>,
    cancel: CancelHandle,
    decoder: LineDecoder,
    window: LineWindow,
    publish_mode: PublishMode,
    stats: SessionStats,
    started_at: Instant,
}

impl<S> StreamSession<S>
where
    S: ByteSource + ?Sized + 'static,
{
    /// Spawn a session on the current tokio runtime
    ///
    /// The session starts publishing as soon as the sink accepts it.
    pub fn start(
        id: SessionId,
        category: Category,
        source: Arc<S>,
        config: &SessionConfig,
        sink: Arc<dyn SessionSink>,
    ) -> SessionHandle {
        Self::start_with_cancel(id, category, source, config, sink, CancelHandle::new())
    }

    /// Spawn a session controlled by an existing cancel handle
    pub fn start_with_cancel(
        id: SessionId,
        category: Category,
        source: Arc<S>,
        config: &SessionConfig,
        sink: Arc<dyn SessionSink>,
        cancel: CancelHandle,
    ) -> SessionHandle {
        let session = Self {
            id,
            category,
            source,
            sink,
            cancel: cancel.clone(),
            decoder: LineDecoder::with_options(config.decoder.clone()),
            window: LineWindow::new(config.window_capacity),
            publish_mode: config.publish_mode,
            stats: SessionStats::default(),
            started_at: Instant::now(),
        };

        tracing::debug!(session = %id, category = %category, "Starting session");
        let task = tokio::spawn(session.run());

        SessionHandle {
            id,
            category,
            cancel,
            task,
        }
    }

    async fn run(mut self) -> SessionOutcome {
        let outcome = match self.consume().await {
            Ok(true) => SessionOutcome::Completed(self.finish_stats()),
            Ok(false) => SessionOutcome::Cancelled(self.finish_stats()),
            Err(error) => {
                let kind = error.kind();
                // A failure racing a cancel is the cancel's doing
                if self.cancel.is_cancelled() {
                    SessionOutcome::Cancelled(self.finish_stats())
                } else {
                    tracing::warn!(
                        session = %self.id,
                        category = %self.category,
                        error = %error,
                        "Session failed"
                    );
                    self.sink
                        .report_failure(StreamFailure::new(self.id, self.category, &error));
                    SessionOutcome::Failed(kind, self.finish_stats())
                }
            }
        };

        tracing::debug!(
            session = %self.id,
            outcome = outcome.label(),
            lines = outcome.stats().lines,
            publishes = outcome.stats().publishes,
            "Session retired"
        );
        self.sink.retire(self.id, &outcome);
        outcome
    }

    /// Drive the stream; Ok(true) on end-of-stream, Ok(false) on cancellation
    async fn consume(&mut self) -> Result<bool, SessionError> {
        let source = Arc::clone(&self.source);
        let opened = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ok(false),
            opened = source.open(self.category) => opened,
        };
        let mut stream: ByteStream = opened.map_err(SessionError::Open)?;
        tracing::debug!(session = %self.id, source = source.name(), "Stream open");

        loop {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }

            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Ok(false),
                next = stream.next() => next,
            };

            if self.cancel.is_cancelled() {
                return Ok(false);
            }

            match next {
                Some(Ok(chunk)) => {
                    self.stats.chunks += 1;
                    self.stats.bytes += chunk.len() as u64;
                    let lines = self.decoder.feed(&chunk)?;
                    self.accept(lines);
                }
                Some(Err(error)) => return Err(SessionError::Read(error)),
                None => {
                    let last = self.decoder.finish()?;
                    self.accept(last);
                    return Ok(true);
                }
            }
        }
    }

    /// Push decoded lines into the window and publish per mode
    fn accept(&mut self, lines: impl IntoIterator<Item = String>) {
        let mut added = false;

        for text in lines.into_iter().filter(|l| !is_blank(l)) {
            if self.window.push(Line::new(text, self.category)).is_some() {
                self.stats.evicted += 1;
            }
            self.stats.lines += 1;
            added = true;

            if self.publish_mode == PublishMode::PerLine && !self.publish() {
                return;
            }
        }

        if added && self.publish_mode == PublishMode::PerChunk {
            self.publish();
        }
    }

    /// Offer the current window; false once the session may no longer publish
    fn publish(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let delivered = self
            .sink
            .publish(self.id, self.category, self.window.snapshot());
        if delivered {
            self.stats.publishes += 1;
        }
        delivered
    }

    fn finish_stats(&mut self) -> SessionStats {
        self.stats.duration = self.started_at.elapsed();
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{ChannelSource, SourceError};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    /// Sink that accepts everything and records it
    #[derive(Default)]
    struct RecordingSink {
        published: Mutex<Vec<Vec<String>>>,
        failures: Mutex<Vec<StreamFailure>>,
        retired: Mutex<Vec<(SessionId, &'static str)>>,
    }

    impl SessionSink for RecordingSink {
        fn publish(&self, _: SessionId, _: Category, snapshot: WindowSnapshot) -> bool {
            let texts = snapshot.texts().into_iter().map(String::from).collect();
            self.published.lock().push(texts);
            true
        }

        fn report_failure(&self, failure: StreamFailure) -> bool {
            self.failures.lock().push(failure);
            true
        }

        fn retire(&self, session: SessionId, outcome: &SessionOutcome) {
            self.retired.lock().push((session, outcome.label()));
        }
    }

    fn config(capacity: usize, mode: PublishMode) -> SessionConfig {
        SessionConfig {
            window_capacity: capacity,
            publish_mode: mode,
            ..Default::default()
        }
    }

    #[test]
    fn test_session_ids_increase() {
        let a = SessionId::next();
        let b = SessionId::next();
        assert!(b > a);
        assert_eq!(SessionId::from_raw(4).to_string(), "session-4");
    }

    #[tokio::test]
    async fn test_cancel_handle_is_idempotent() {
        let cancel = CancelHandle::new();
        assert!(!cancel.is_cancelled());
        assert!(cancel.cancel());
        assert!(!cancel.cancel());
        assert!(cancel.is_cancelled());
        // Resolves immediately once cancelled
        cancel.cancelled().await;
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let cancel = CancelHandle::new();
        let waiter = {
            let cancel = cancel.clone();
            tokio::spawn(async move { cancel.cancelled().await })
        };
        tokio::task::yield_now().await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[test]
    fn test_publish_mode_parse() {
        assert_eq!("per_chunk".parse::<PublishMode>(), Ok(PublishMode::PerChunk));
        assert_eq!("per-line".parse::<PublishMode>(), Ok(PublishMode::PerLine));
        assert!("sometimes".parse::<PublishMode>().is_err());
    }

    #[test]
    fn test_default_publishes_every_line() {
        assert_eq!(PublishMode::default(), PublishMode::PerLine);
        assert_eq!(SessionConfig::default().publish_mode, PublishMode::PerLine);
    }

    #[tokio::test]
    async fn test_completes_and_flushes_trailing_line() {
        let source = Arc::new(ChannelSource::new());
        let sink = Arc::new(RecordingSink::default());
        let handle = StreamSession::start(
            SessionId::next(),
            Category::Normal,
            Arc::clone(&source),
            &config(2, PublishMode::PerChunk),
            sink.clone(),
        );

        let feed = source.next_feed().await.unwrap();
        assert!(feed.send(b"a=1\nb=2\n".to_vec()).await);
        assert!(feed.send(b"\n\nc=3".to_vec()).await);
        drop(feed);

        let outcome = handle.join().await;
        assert!(matches!(outcome, SessionOutcome::Completed(_)));
        assert_eq!(outcome.stats().lines, 3);
        assert_eq!(outcome.stats().evicted, 1);
        assert_eq!(
            *sink.published.lock(),
            vec![vec!["a=1", "b=2"], vec!["b=2", "c=3"]]
        );
        assert_eq!(source.open_streams(), 0);
        assert_eq!(sink.retired.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_per_line_publishes_each_line() {
        let source = Arc::new(ChannelSource::new());
        let sink = Arc::new(RecordingSink::default());
        let handle = StreamSession::start(
            SessionId::next(),
            Category::Dos,
            Arc::clone(&source),
            &config(2, PublishMode::PerLine),
            sink.clone(),
        );

        let feed = source.next_feed().await.unwrap();
        feed.send(b"x\ny\nz\n".to_vec()).await;
        drop(feed);
        handle.join().await;

        assert_eq!(
            *sink.published.lock(),
            vec![vec!["x"], vec!["x", "y"], vec!["y", "z"]]
        );
    }

    #[tokio::test]
    async fn test_cancel_unblocks_pending_read() {
        let source = Arc::new(ChannelSource::new());
        let sink = Arc::new(RecordingSink::default());
        let handle = StreamSession::start(
            SessionId::next(),
            Category::Gear,
            Arc::clone(&source),
            &SessionConfig::default(),
            sink.clone(),
        );

        // Keep the feed open so the read stays pending
        let feed = source.next_feed().await.unwrap();
        assert!(handle.cancel());
        assert!(!handle.cancel());

        let outcome = tokio::time::timeout(Duration::from_secs(1), handle.join())
            .await
            .expect("cancel must unblock the read");
        assert!(matches!(outcome, SessionOutcome::Cancelled(_)));
        assert!(feed.is_closed());
        assert!(sink.failures.lock().is_empty());
    }

    #[tokio::test]
    async fn test_open_failure_is_reported_once() {
        let source = Arc::new(ChannelSource::new());
        source.refuse_opens("dataset not loaded");
        let sink = Arc::new(RecordingSink::default());
        let handle = StreamSession::start(
            SessionId::next(),
            Category::Fuzzy,
            source,
            &SessionConfig::default(),
            sink.clone(),
        );

        let outcome = handle.join().await;
        assert!(matches!(outcome, SessionOutcome::Failed(FailureKind::Open, _)));

        let failures = sink.failures.lock();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, FailureKind::Open);
        assert!(failures[0].message.contains("dataset not loaded"));
        assert!(sink.published.lock().is_empty());
    }

    #[tokio::test]
    async fn test_mid_stream_failure_keeps_published_window() {
        let source = Arc::new(ChannelSource::new());
        let sink = Arc::new(RecordingSink::default());
        let handle = StreamSession::start(
            SessionId::next(),
            Category::Rpm,
            Arc::clone(&source),
            &SessionConfig::default(),
            sink.clone(),
        );

        let feed = source.next_feed().await.unwrap();
        feed.send(b"ok\n".to_vec()).await;
        feed.fail(SourceError::Read("connection reset".into())).await;

        let outcome = handle.join().await;
        assert!(matches!(
            outcome,
            SessionOutcome::Failed(FailureKind::MidStream, _)
        ));
        assert_eq!(*sink.published.lock(), vec![vec!["ok"]]);
        assert_eq!(sink.failures.lock().len(), 1);
        assert_eq!(source.open_streams(), 0);
    }

    #[tokio::test]
    async fn test_decode_failure_is_mid_stream() {
        let source = Arc::new(ChannelSource::new());
        let sink = Arc::new(RecordingSink::default());
        let mut cfg = SessionConfig::default();
        cfg.decoder.max_line_bytes = 4;
        let handle = StreamSession::start(
            SessionId::next(),
            Category::Normal,
            Arc::clone(&source),
            &cfg,
            sink.clone(),
        );

        let feed = source.next_feed().await.unwrap();
        feed.send(b"0123456789".to_vec()).await;

        let outcome = handle.join().await;
        assert!(matches!(
            outcome,
            SessionOutcome::Failed(FailureKind::MidStream, _)
        ));
        assert!(sink.failures.lock()[0].message.contains("4 bytes"));
    }
}
