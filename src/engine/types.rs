//! Run engine types

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::annotations::Highlight;

/// Lifecycle state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Created, not yet picked up by its worker
    Pending,
    Running,
    /// Cancellation requested while a scoring call was in flight
    Cancelling,
    Completed,
    Cancelled,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Cancelling => "cancelling",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Pending, running or cancelling
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running | Self::Cancelling)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Pending, Failed)
                | (Running, Cancelling)
                | (Running, Completed)
                | (Running, Cancelled)
                | (Running, Failed)
                | (Cancelling, Cancelled)
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event produced by a run, in emission order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// A chunk was accepted and its highlight appended to the document
    Highlight { run_id: String, highlight: Highlight },
    /// One batch settled
    Progress {
        run_id: String,
        processed_chunk_count: usize,
        total_chunk_count_estimate: usize,
    },
    StateChanged {
        run_id: String,
        new_state: RunState,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl RunEvent {
    /// Event name used on push streams
    pub fn name(&self) -> &'static str {
        match self {
            Self::Highlight { .. } => "highlight",
            Self::Progress { .. } => "progress",
            Self::StateChanged { .. } => "state_changed",
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            Self::Highlight { run_id, .. }
            | Self::Progress { run_id, .. }
            | Self::StateChanged { run_id, .. } => run_id,
        }
    }

    /// Whether this event announces a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::StateChanged { new_state, .. } if new_state.is_terminal())
    }
}

/// An event with its position in the run's event log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequencedEvent {
    /// Zero-based, contiguous within a run
    pub seq: usize,
    #[serde(flatten)]
    pub event: RunEvent,
}

/// A batch-level scoring problem recorded against a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchDiagnostic {
    pub batch_index: usize,
    /// Ordinal of the first chunk in the batch
    pub first_chunk: usize,
    pub chunk_count: usize,
    /// `scoring_unavailable` or `scoring_malformed`
    pub kind: String,
    pub message: String,
    /// Whether the batch was still scored (partially)
    pub recovered: bool,
    pub at: DateTime<Utc>,
}

/// Per-run parameters fixed at start
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Fraction of words to highlight, in (0, 1]
    pub density_target: f32,
    /// Minimum relevance for acceptance, in [0, 1]
    pub min_threshold: f32,
    /// Zero-based pages to consider; none means every page
    pub pages: Option<BTreeSet<u32>>,
}

impl RunOptions {
    pub fn includes_page(&self, page_index: u32) -> bool {
        self.pages
            .as_ref()
            .map(|pages| pages.contains(&page_index))
            .unwrap_or(true)
    }
}

/// Mutable bookkeeping of one run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub state: RunState,
    pub emitted_count: usize,
    pub failure_reason: Option<String>,
    pub processed_chunks: usize,
    pub total_chunks: usize,
    pub batches_total: usize,
    pub batches_failed: usize,
    pub diagnostics: Vec<BatchDiagnostic>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// First time a consumer saw the terminal state
    pub fetched_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    pub fn new() -> Self {
        Self {
            state: RunState::Pending,
            emitted_count: 0,
            failure_reason: None,
            processed_chunks: 0,
            total_chunks: 0,
            batches_total: 0,
            batches_failed: 0,
            diagnostics: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            fetched_at: None,
        }
    }
}

impl Default for RunRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSnapshot {
    pub run_id: String,
    pub document_id: String,
    pub state: RunState,
    pub emitted_count: usize,
    pub cancel_requested: bool,
    /// Cancelled after emitting at least one highlight
    pub partial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub processed_chunks: usize,
    pub total_chunks: usize,
    pub batches_total: usize,
    pub batches_failed: usize,
    pub diagnostics: Vec<BatchDiagnostic>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        use RunState::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Running.can_transition_to(Cancelling));
        assert!(Cancelling.can_transition_to(Cancelled));
        assert!(!Cancelling.can_transition_to(Completed));
        assert!(!Running.can_transition_to(Pending));

        for terminal in [Completed, Cancelled, Failed] {
            assert!(terminal.is_terminal());
            for next in [Pending, Running, Cancelling, Completed, Cancelled, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_event_serialization() {
        let event = SequencedEvent {
            seq: 3,
            event: RunEvent::StateChanged {
                run_id: "run-1".to_string(),
                new_state: RunState::Failed,
                reason: Some("all batches failed".to_string()),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["seq"], 3);
        assert_eq!(json["type"], "state_changed");
        assert_eq!(json["new_state"], "failed");
        assert_eq!(json["reason"], "all batches failed");
        assert!(event.event.is_terminal());

        let progress = RunEvent::Progress {
            run_id: "run-1".to_string(),
            processed_chunk_count: 8,
            total_chunk_count_estimate: 20,
        };
        assert_eq!(progress.name(), "progress");
        assert!(!progress.is_terminal());
        assert_eq!(serde_json::to_value(&progress).unwrap()["processed_chunk_count"], 8);
    }

    #[test]
    fn test_page_filter() {
        let options = RunOptions {
            density_target: 0.1,
            min_threshold: 0.6,
            pages: Some([2, 4].into_iter().collect()),
        };
        assert!(options.includes_page(2));
        assert!(!options.includes_page(3));
    }
}
