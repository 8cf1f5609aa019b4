//! Linewindow Core - Cancellable Streaming Line-Window Controller
//!
//! Consumes a long-lived byte stream for one selected traffic category,
//! splits it into lines, and keeps the most recent lines in a bounded
//! window that is published to a host after every change. Switching the
//! category supersedes the running stream: the old one is cancelled and
//! torn down, and none of its output can reach the host afterwards.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                              Host                                │
//! │        select(category)  ▲ on_window_update / on_stream_error    │
//! └────────────┬─────────────┼───────────────────────────────────────┘
//!              │             │
//! ┌────────────┼─────────────┼───────────────────────────────────────┐
//! │            ▼             │           LINEWINDOW CORE             │
//! │  ┌───────────────────────┴──────┐                                │
//! │  │      SessionSupervisor       │  at most one active session    │
//! │  │  (publication gate, stats)   │                                │
//! │  └──────────────┬───────────────┘                                │
//! │                 │ spawn / cancel                                 │
//! │  ┌──────────────┴───────────────────────────────────────────┐   │
//! │  │                     StreamSession                         │   │
//! │  │  ByteSource ──► LineDecoder ──► LineWindow ──► snapshot   │   │
//! │  │  (http/chan)    (UTF-8, \n)     (last N lines)            │   │
//! │  └───────────────────────────────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`SessionSupervisor`]: owns the active session and gates publication
//! - [`StreamSession`]: one cancellable stream consumption lifecycle
//! - [`LineDecoder`]: incremental UTF-8 line splitter
//! - [`LineWindow`]: bounded buffer of recent lines
//! - [`ByteSource`]: transport boundary ([`HttpSource`], [`ChannelSource`])
//! - [`FeedObserver`]: host callbacks ([`ChannelObserver`] for async hosts)
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use linewindow_core::{
//!     config::load_config, Category, ChannelObserver, FeedEvent, SessionSupervisor,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let source = Arc::new(config.http_source()?);
//!     let (observer, mut events) = ChannelObserver::new();
//!
//!     let supervisor = SessionSupervisor::new(source, Arc::new(observer), config.session_config());
//!     supervisor.select(Category::Dos);
//!
//!     while let Some(event) = events.recv().await {
//!         if let FeedEvent::Window(update) = event {
//!             for line in &update.lines {
//!                 println!("{}", line.text());
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod category;
pub mod config;
pub mod decoder;
pub mod error;
pub mod observer;
pub mod session;
pub mod source;
pub mod supervisor;
pub mod window;

pub use category::{Category, UnknownCategory};
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, FeedConfig,
};
pub use decoder::{is_blank, DecodeError, DecoderOptions, LineDecoder, Utf8Policy};
pub use error::{FailureKind, SessionError, StreamFailure};
pub use observer::{ChannelObserver, FeedEvent, FeedObserver, WindowUpdate};
pub use session::{
    CancelHandle, PublishMode, SessionConfig, SessionHandle, SessionId, SessionOutcome,
    SessionSink, SessionStats, StreamSession,
};
pub use source::{ByteSource, ByteStream, ChannelFeed, ChannelSource, HttpSource, SourceError};
pub use supervisor::{SessionSupervisor, SupervisorState, SupervisorStats};
pub use window::{Line, LineWindow, WindowSnapshot, DEFAULT_WINDOW_CAPACITY};
