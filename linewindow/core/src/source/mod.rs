//! Byte Sources
//!
//! The transport boundary of the controller. A [`ByteSource`] opens one byte
//! stream per session, parameterised by the selected [`Category`]. The
//! controller never retries or reconnects; it consumes whatever the stream
//! yields until end-of-stream, failure, or cancellation.
//!
//! # Available Sources
//!
//! - **[`HttpSource`]**: streaming HTTP GET against a remote endpoint
//! - **[`ChannelSource`]**: in-process producer for embedding and tests
//!
//! Dropping a [`ByteStream`] must release the underlying connection; the
//! session relies on that to tear a superseded stream down.

mod channel;
mod http;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::category::Category;

pub use channel::{ChannelFeed, ChannelSource};
pub use http::HttpSource;

/// Raw bytes as delivered by the transport
pub type RawChunk = Vec<u8>;

/// An open, ordered stream of raw chunks
pub type ByteStream = BoxStream<'static, Result<RawChunk, SourceError>>;

/// Transport-level errors
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The connection could not be established
    #[error("failed to connect to {url}: {message}")]
    Connect {
        /// Endpoint that was contacted
        url: String,
        /// Underlying error text
        message: String,
    },

    /// The endpoint answered with a non-success status
    #[error("source returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, as text
        body: String,
    },

    /// The source refused to open a stream
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// Reading from an open stream failed
    #[error("read failed: {0}")]
    Read(String),
}

impl SourceError {
    /// Whether the error can only occur while opening a stream
    #[must_use]
    pub fn is_open_failure(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Status { .. } | Self::Unavailable(_)
        )
    }
}

/// Something that can open a byte stream for a category
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Short name for logs (e.g. "http", "channel")
    fn name(&self) -> &str;

    /// Open a fresh stream for `category`
    ///
    /// Each call must return an independent stream; sessions never share one.
    async fn open(&self, category: Category) -> Result<ByteStream, SourceError>;
}
