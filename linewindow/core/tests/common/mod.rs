//! Shared test doubles for the integration suites

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use linewindow_core::{
    Category, ChannelSource, FeedEvent, FeedObserver, PublishMode, SessionConfig,
    SessionSupervisor, StreamFailure, WindowUpdate,
};

/// How long any single wait in a test may take
pub const WAIT: Duration = Duration::from_secs(5);

/// Observer that records every callback in delivery order
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<FeedEvent>>,
    notify: Notify,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of events so far; use as a boundary for [`Recorder::since`]
    pub fn mark(&self) -> usize {
        self.events.lock().len()
    }

    pub fn events(&self) -> Vec<FeedEvent> {
        self.events.lock().clone()
    }

    pub fn since(&self, mark: usize) -> Vec<FeedEvent> {
        self.events.lock()[mark..].to_vec()
    }

    pub fn windows(&self) -> Vec<WindowUpdate> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                FeedEvent::Window(update) => Some(update.clone()),
                FeedEvent::Error(_) => None,
            })
            .collect()
    }

    pub fn failures(&self) -> Vec<StreamFailure> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                FeedEvent::Error(failure) => Some(failure.clone()),
                FeedEvent::Window(_) => None,
            })
            .collect()
    }

    /// Window texts of every published update, in order
    pub fn window_texts(&self) -> Vec<Vec<String>> {
        self.windows()
            .iter()
            .map(|u| u.lines.texts().into_iter().map(String::from).collect())
            .collect()
    }

    /// Wait until `done` holds for the recorded events
    pub async fn wait_until(&self, done: impl Fn(&[FeedEvent]) -> bool) {
        tokio::time::timeout(WAIT, async {
            loop {
                let notified = self.notify.notified();
                if done(&self.events.lock()) {
                    return;
                }
                notified.await;
            }
        })
        .await
        .expect("condition was not reached in time");
    }

    fn record(&self, event: FeedEvent) {
        self.events.lock().push(event);
        self.notify.notify_waiters();
    }
}

impl FeedObserver for Recorder {
    fn on_window_update(&self, update: &WindowUpdate) {
        self.record(FeedEvent::Window(update.clone()));
    }

    fn on_stream_error(&self, failure: &StreamFailure) {
        self.record(FeedEvent::Error(failure.clone()));
    }
}

pub fn session_config(capacity: usize, publish_mode: PublishMode) -> SessionConfig {
    SessionConfig {
        window_capacity: capacity,
        publish_mode,
        ..SessionConfig::default()
    }
}

/// Supervisor over a fresh channel source with a recording observer
pub fn harness(
    config: SessionConfig,
) -> (SessionSupervisor<ChannelSource>, ChannelSource, Arc<Recorder>) {
    let source = ChannelSource::new();
    let recorder = Recorder::new();
    let supervisor = SessionSupervisor::new(Arc::new(source.clone()), recorder.clone(), config);
    (supervisor, source, recorder)
}

/// Whether any recorded window contains a line of `category`
pub fn has_lines_of(events: &[FeedEvent], category: Category) -> bool {
    events.iter().any(|e| match e {
        FeedEvent::Window(update) => {
            update.category == category || update.lines.iter().any(|l| l.category() == category)
        }
        FeedEvent::Error(failure) => failure.category == category,
    })
}
