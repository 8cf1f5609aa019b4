//! Linewindow Monitor - Follow a Live Traffic Feed by Category
//!
//! Terminal host for the linewindow controller. Streams the selected
//! category from a feed server and redraws the most recent lines after
//! every update. Typing another category name switches the feed; the old
//! stream is torn down and never shows up again.
//!
//! # Usage
//!
//! ```bash
//! # Start following DoS traffic from the default server
//! linewindow-monitor DoS
//!
//! # Custom server and a larger window
//! linewindow-monitor --base-url http://10.0.0.5:8000 --capacity 40 Fuzzy
//!
//! # Machine-readable output, one JSON event per line
//! linewindow-monitor --json Normal
//!
//! # Verbose logging (stderr)
//! RUST_LOG=linewindow_core=debug linewindow-monitor
//! ```
//!
//! # Commands (stdin)
//!
//! - `DoS`, `Fuzzy`, `RPM`, `Gear`, `Normal`: select (or restart) a category
//! - `stop`: cancel the running stream
//! - `status`: print supervisor state and counters to stderr
//! - `quit` / end of input: shut down
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown

use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};

use linewindow_core::{
    config::{load_config_from_path, ConfigOverrides},
    default_config_path, Category, ChannelObserver, FeedConfig, FeedEvent, PublishMode,
    SessionId, SessionSupervisor, StreamFailure, WindowUpdate,
};

/// Linewindow Monitor - follow a live traffic feed by category
#[derive(Parser, Debug)]
#[command(name = "linewindow-monitor")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Category to follow at startup (DoS, Fuzzy, RPM, Gear, Normal)
    #[arg(value_name = "CATEGORY")]
    category: Option<Category>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "LINEWINDOW_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Feed server base URL
    #[arg(short = 'u', long, value_name = "URL")]
    base_url: Option<String>,

    /// Number of lines kept in the window
    #[arg(short = 'n', long, value_name = "LINES")]
    capacity: Option<usize>,

    /// Publish once per line (default) or once per chunk (per_line, per_chunk)
    #[arg(short = 'p', long, value_name = "MODE")]
    publish_mode: Option<PublishMode>,

    /// Print events as JSON lines instead of redrawing the window
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "LINEWINDOW_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

/// A line typed on stdin
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Select(Category),
    Stop,
    Status,
    Quit,
    Empty,
}

impl Command {
    fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        Ok(match input.to_ascii_lowercase().as_str() {
            "" => Self::Empty,
            "quit" | "exit" | "q" => Self::Quit,
            "stop" => Self::Stop,
            "status" => Self::Status,
            _ => Self::Select(input.parse()?),
        })
    }
}

/// SGR foreground color per category
fn category_color(category: Category) -> &'static str {
    match category {
        Category::Dos => "31",
        Category::Fuzzy => "33",
        Category::Rpm => "35",
        Category::Gear => "34",
        Category::Normal => "32",
    }
}

/// Writes window updates and failures for a human or a pipe
struct Renderer {
    json: bool,
    redraw: bool,
}

impl Renderer {
    fn new(json: bool) -> Self {
        Self {
            json,
            redraw: !json && std::io::stdout().is_terminal(),
        }
    }

    fn render(&self, event: &FeedEvent) -> Result<()> {
        if self.json {
            let mut out = std::io::stdout().lock();
            serde_json::to_writer(&mut out, event)?;
            writeln!(out)?;
            return Ok(out.flush()?);
        }

        match event {
            FeedEvent::Window(update) => self.render_window(update),
            FeedEvent::Error(failure) => {
                Self::render_failure(failure);
                Ok(())
            }
        }
    }

    fn render_window(&self, update: &WindowUpdate) -> Result<()> {
        let mut out = std::io::stdout().lock();
        let color = category_color(update.category);

        if self.redraw {
            // Clear screen, cursor home
            write!(out, "\x1b[2J\x1b[H")?;
        }
        writeln!(
            out,
            "── {} ({}, {} lines) ──",
            update.category,
            update.session,
            update.lines.len()
        )?;
        for line in &update.lines {
            writeln!(out, "\x1b[{color}m{}\x1b[0m", line.plain_text())?;
        }
        Ok(out.flush()?)
    }

    fn render_failure(failure: &StreamFailure) {
        eprintln!("error: {failure}");
    }
}

fn load_feed_config(args: &Args) -> Result<FeedConfig> {
    let path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(path).context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(ref url) = args.base_url {
        overrides = overrides.with_base_url(url.clone());
    }
    if let Some(capacity) = args.capacity {
        overrides = overrides.with_window_capacity(capacity);
    }
    if let Some(mode) = args.publish_mode {
        overrides = overrides.with_publish_mode(mode);
    }
    overrides
        .apply(&mut config)
        .context("Invalid command-line option")?;

    info!(
        source = %config.source(),
        base_url = %config.base_url,
        capacity = config.window_capacity,
        "Configuration loaded"
    );
    Ok(config)
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the window
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("linewindow_monitor={}", args.log_level).parse()?)
                .add_directive(format!("linewindow_core={}", args.log_level).parse()?),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let config = load_feed_config(&args)?;
    let source = Arc::new(
        config
            .http_source()
            .context("Failed to create HTTP source")?,
    );
    let (observer, mut events) = ChannelObserver::new();
    let supervisor = SessionSupervisor::new(source, Arc::new(observer), config.session_config());
    let renderer = Renderer::new(args.json);

    // Events of earlier selections may still be queued; only the newest counts
    let mut current: Option<SessionId> = args.category.map(|c| supervisor.select(c));

    let mut commands = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,

            line = commands.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    info!("End of input, shutting down");
                    break;
                };
                match Command::parse(&line) {
                    Ok(Command::Select(category)) => current = Some(supervisor.select(category)),
                    Ok(Command::Stop) => {
                        supervisor.cancel_active();
                        current = None;
                    }
                    Ok(Command::Status) => {
                        eprintln!("{:?}", supervisor.state());
                        eprintln!("{:?}", supervisor.stats());
                    }
                    Ok(Command::Quit) => break,
                    Ok(Command::Empty) => {}
                    Err(e) => eprintln!("error: {e}"),
                }
            }

            Some(event) = events.recv() => {
                if Some(event.session()) == current {
                    renderer.render(&event)?;
                }
            }
        }
    }

    supervisor.shutdown().await;
    info!(stats = ?supervisor.stats(), "Monitor stopped");
    Ok(())
}
