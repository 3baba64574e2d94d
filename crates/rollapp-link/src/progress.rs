// Operator-facing progress side channel
//
// Progress strings are for a human watching a console (a status line, a spinner).
// They are not log records and nothing consumes a return value from them.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub trait ProgressSink: Send + Sync {
    fn report(&self, message: &str);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _message: &str) {}
}

/// Emits progress as `info` events under the `progress` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, message: &str) {
        info!(target: "progress", "{}", message);
    }
}

/// Keeps the latest status line in a file (e.g. `relayer_status.txt`).
#[derive(Debug, Clone)]
pub struct StatusFileProgress {
    file: PathBuf,
}

impl StatusFileProgress {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self { file: file.into() }
    }
}

impl ProgressSink for StatusFileProgress {
    fn report(&self, message: &str) {
        if let Some(parent) = self.file.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("Cannot create status directory {}: {}", parent.display(), e);
                return;
            }
        }
        if let Err(e) = std::fs::write(&self.file, message) {
            warn!("Cannot write status file {}: {}", self.file.display(), e);
        }
    }
}

/// Forwards every message to each inner sink in order.
#[derive(Default, Clone)]
pub struct FanoutProgress {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl FanoutProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl ProgressSink for FanoutProgress {
    fn report(&self, message: &str) {
        for sink in &self.sinks {
            sink.report(message);
        }
    }
}
