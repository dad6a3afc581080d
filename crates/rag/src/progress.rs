//! Progress events for indexing passes.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Stage of an indexing pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexPhase {
    /// Listing and hashing vault files
    Discover,
    /// Chunking, embedding and upserting one note
    Embed,
    /// Deleting chunks of notes gone from disk
    Remove,
    /// Persisting vault metadata
    Commit,
}

impl fmt::Display for IndexPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IndexPhase::Discover => "discover",
            IndexPhase::Embed => "embed",
            IndexPhase::Remove => "remove",
            IndexPhase::Commit => "commit",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub phase: IndexPhase,
    pub current: usize,
    pub total: Option<usize>,
    /// Vault-relative path or a short note about the step
    pub message: String,
    pub elapsed_secs: f64,
}

impl ProgressEvent {
    pub fn percentage(&self) -> Option<f64> {
        self.total.map(|t| {
            if t > 0 {
                (self.current as f64 / t as f64) * 100.0
            } else {
                100.0
            }
        })
    }

    /// e.g. `[embed] 3/10 (30%) - projects/garden.md`
    pub fn format_simple(&self) -> String {
        let progress = match self.total {
            Some(total) => format!("{}/{}", self.current, total),
            None => self.current.to_string(),
        };
        let pct = self
            .percentage()
            .map(|p| format!(" ({:.0}%)", p))
            .unwrap_or_default();

        format!("[{}] {}{} - {}", self.phase, progress, pct, self.message)
    }
}

pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Forwards events to an optional callback, stamping elapsed time.
#[derive(Clone)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    started: Instant,
}

impl ProgressReporter {
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(callback),
            started: Instant::now(),
        }
    }

    pub fn noop() -> Self {
        Self {
            callback: None,
            started: Instant::now(),
        }
    }

    pub fn emit(
        &self,
        phase: IndexPhase,
        current: usize,
        total: Option<usize>,
        message: impl Into<String>,
    ) {
        let Some(callback) = &self.callback else {
            return;
        };

        let event = ProgressEvent {
            phase,
            current,
            total,
            message: message.into(),
            elapsed_secs: self.started.elapsed().as_secs_f64(),
        };

        tracing::trace!(phase = %event.phase, current, total = ?total, "{}", event.message);
        callback(event);
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("enabled", &self.callback.is_some())
            .finish()
    }
}
