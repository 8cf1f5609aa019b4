//! In-Process Byte Source
//!
//! Channel-backed source for embedding the controller next to its producer
//! (no network in between) and for driving sessions deterministically.
//!
//! # Usage
//!
//! ```ignore
//! let source = ChannelSource::new();
//! let supervisor = SessionSupervisor::new(Arc::new(source.clone()), observer, config);
//!
//! supervisor.select(Category::Dos);
//! let feed = source.next_feed().await.unwrap();
//! feed.send(b"a=1\nb=2\n").await;
//! drop(feed); // end-of-stream
//! ```
//!
//! Every `open` creates a fresh bounded channel whose producer end, a
//! [`ChannelFeed`], is handed to whoever awaits [`ChannelSource::next_feed`].
//! The source counts opened and released streams so leaked handles show up.

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ByteSource, ByteStream, RawChunk, SourceError};
use crate::category::Category;

/// Default chunk buffer per stream
const DEFAULT_STREAM_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct Counters {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// In-process source handing out one [`ChannelFeed`] per opened stream
#[derive(Clone)]
pub struct ChannelSource {
    feeds_tx: mpsc::UnboundedSender<ChannelFeed>,
    feeds_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<ChannelFeed>>>,
    counters: Arc<Counters>,
    refusal: Arc<Mutex<Option<String>>>,
    stream_capacity: usize,
}

impl Default for ChannelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelSource {
    /// Create a source with the default per-stream buffer
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_STREAM_CAPACITY)
    }

    /// Create a source with a custom per-stream chunk buffer
    #[must_use]
    pub fn with_capacity(stream_capacity: usize) -> Self {
        let (feeds_tx, feeds_rx) = mpsc::unbounded_channel();
        Self {
            feeds_tx,
            feeds_rx: Arc::new(tokio::sync::Mutex::new(feeds_rx)),
            counters: Arc::new(Counters::default()),
            refusal: Arc::new(Mutex::new(None)),
            stream_capacity: stream_capacity.max(1),
        }
    }

    /// Wait for the producer end of the next opened stream
    pub async fn next_feed(&self) -> Option<ChannelFeed> {
        self.feeds_rx.lock().await.recv().await
    }

    /// Make every subsequent `open` fail with `reason`
    pub fn refuse_opens(&self, reason: impl Into<String>) {
        *self.refusal.lock() = Some(reason.into());
    }

    /// Accept opens again
    pub fn accept_opens(&self) {
        *self.refusal.lock() = None;
    }

    /// Streams opened over the source's lifetime
    #[must_use]
    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    /// Streams released (dropped by their consumer)
    #[must_use]
    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// Streams currently held by a consumer
    #[must_use]
    pub fn open_streams(&self) -> usize {
        self.opened().saturating_sub(self.closed())
    }
}

#[async_trait]
impl ByteSource for ChannelSource {
    fn name(&self) -> &str {
        "channel"
    }

    async fn open(&self, category: Category) -> Result<ByteStream, SourceError> {
        if let Some(reason) = self.refusal.lock().clone() {
            return Err(SourceError::Unavailable(reason));
        }

        let (tx, rx) = mpsc::channel(self.stream_capacity);
        self.counters.opened.fetch_add(1, Ordering::SeqCst);

        let stream = TrackedStream {
            inner: ReceiverStream::new(rx),
            counters: Arc::clone(&self.counters),
        };

        if self.feeds_tx.send(ChannelFeed { category, tx }).is_err() {
            // The source side is gone; the stream ends immediately
            tracing::warn!(category = %category, "Channel source has no producer side");
        }

        Ok(stream.boxed())
    }
}

/// Consumer end that counts itself released on drop
struct TrackedStream {
    inner: ReceiverStream<Result<RawChunk, SourceError>>,
    counters: Arc<Counters>,
}

impl Stream for TrackedStream {
    type Item = Result<RawChunk, SourceError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Producer end of one opened stream
///
/// Dropping the feed ends the stream normally.
#[derive(Debug)]
pub struct ChannelFeed {
    category: Category,
    tx: mpsc::Sender<Result<RawChunk, SourceError>>,
}

impl ChannelFeed {
    /// Category the stream was opened for
    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    /// Push one chunk; returns false once the consumer released the stream
    pub async fn send(&self, chunk: impl Into<RawChunk>) -> bool {
        self.tx.send(Ok(chunk.into())).await.is_ok()
    }

    /// Fail the stream with `error`; returns false if already released
    pub async fn fail(&self, error: SourceError) -> bool {
        self.tx.send(Err(error)).await.is_ok()
    }

    /// Whether the consumer has released the stream
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Wait until the consumer releases the stream
    pub async fn closed(&self) {
        self.tx.closed().await;
    }
}
