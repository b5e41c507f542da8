//! Shared handle to one run
//!
//! The worker, the event collector and every status or cancel request hold
//! the same `RunHandle`. Bookkeeping sits behind a short-lived mutex; the
//! event log is append-only and consumers wait on a watch channel for it to
//! grow.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, Stream};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch, Notify};
use uuid::Uuid;

use super::types::{RunEvent, RunRecord, RunSnapshot, RunState, SequencedEvent};

/// Producer side of a run's event channel
///
/// The channel is bounded, so a slow consumer slows the engine instead of
/// growing memory.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<RunEvent>,
}

impl EventSink {
    pub async fn emit(&self, event: RunEvent) {
        if self.tx.send(event).await.is_err() {
            tracing::debug!("Run event dropped, collector has stopped");
        }
    }
}

/// Create a bounded event channel
pub fn event_channel(capacity: usize) -> (EventSink, mpsc::Receiver<RunEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSink { tx }, rx)
}

#[derive(Debug, Clone, Copy, Default)]
struct LogCursor {
    len: usize,
    closed: bool,
}

pub struct RunHandle {
    run_id: String,
    document_id: String,
    record: Mutex<RunRecord>,
    cancel_requested: AtomicBool,
    cancel_notify: Notify,
    state_tx: watch::Sender<RunState>,
    events: RwLock<Vec<SequencedEvent>>,
    cursor_tx: watch::Sender<LogCursor>,
}

impl RunHandle {
    pub fn new(document_id: &str) -> Self {
        let (state_tx, _) = watch::channel(RunState::Pending);
        let (cursor_tx, _) = watch::channel(LogCursor::default());

        Self {
            run_id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            record: Mutex::new(RunRecord::new()),
            cancel_requested: AtomicBool::new(false),
            cancel_notify: Notify::new(),
            state_tx,
            events: RwLock::new(Vec::new()),
            cursor_tx,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn state(&self) -> RunState {
        self.record.lock().state
    }

    pub fn emitted_count(&self) -> usize {
        self.record.lock().emitted_count
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let record = self.record.lock();
        RunSnapshot {
            run_id: self.run_id.clone(),
            document_id: self.document_id.clone(),
            state: record.state,
            emitted_count: record.emitted_count,
            cancel_requested: self.is_cancel_requested(),
            partial: record.state == RunState::Cancelled && record.emitted_count > 0,
            failure_reason: record.failure_reason.clone(),
            processed_chunks: record.processed_chunks,
            total_chunks: record.total_chunks,
            batches_total: record.batches_total,
            batches_failed: record.batches_failed,
            diagnostics: record.diagnostics.clone(),
            created_at: record.created_at,
            started_at: record.started_at,
            completed_at: record.completed_at,
        }
    }

    /// Apply a bookkeeping change
    pub fn update<R>(&self, f: impl FnOnce(&mut RunRecord) -> R) -> R {
        f(&mut self.record.lock())
    }

    /// Move to `next` if the state machine allows it
    pub fn transition(&self, next: RunState, reason: Option<String>) -> bool {
        {
            let mut record = self.record.lock();
            if !record.state.can_transition_to(next) {
                tracing::warn!(
                    run_id = %self.run_id,
                    from = %record.state,
                    to = %next,
                    "Rejected run state transition"
                );
                return false;
            }

            let now = Utc::now();
            record.state = next;
            if next == RunState::Running {
                record.started_at = Some(now);
            }
            if next.is_terminal() {
                record.completed_at = Some(now);
                if next == RunState::Failed {
                    record.failure_reason = reason;
                }
            }
        }

        self.state_tx.send_replace(next);
        true
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    /// Record a cancellation request; true the first time
    pub fn request_cancel(&self) -> bool {
        let first = !self.cancel_requested.swap(true, Ordering::SeqCst);
        if first {
            self.cancel_notify.notify_waiters();
        }
        first
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// Resolves once cancellation has been requested
    pub async fn cancelled(&self) {
        let notified = self.cancel_notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.is_cancel_requested() {
            return;
        }
        notified.await;
    }

    /// Resolves with the terminal state once the run has one
    pub async fn wait_terminal(&self) -> RunState {
        let mut rx = self.state_tx.subscribe();
        let result = rx.wait_for(|state| state.is_terminal()).await.map(|state| *state);
        result.unwrap_or_else(|_| self.state())
    }

    // ========================================================================
    // Event log
    // ========================================================================

    /// Drain the engine's channel into the event log until it closes
    pub async fn collect_events(self: Arc<Self>, mut rx: mpsc::Receiver<RunEvent>) {
        while let Some(event) = rx.recv().await {
            let len = {
                let mut events = self.events.write();
                let seq = events.len();
                events.push(SequencedEvent { seq, event });
                events.len()
            };
            self.cursor_tx.send_modify(|cursor| cursor.len = len);
        }

        self.cursor_tx.send_modify(|cursor| cursor.closed = true);
        tracing::debug!(run_id = %self.run_id, "Run event log closed");
    }

    /// Logged events with `seq >= since`
    pub fn events_since(&self, since: usize) -> Vec<SequencedEvent> {
        let events = self.events.read();
        events.iter().skip(since).cloned().collect()
    }

    /// The logged event with sequence number `seq`
    pub fn event_at(&self, seq: usize) -> Option<SequencedEvent> {
        self.events.read().get(seq).cloned()
    }

    pub fn event_count(&self) -> usize {
        self.events.read().len()
    }

    /// Whether the engine has stopped producing events
    pub fn events_closed(&self) -> bool {
        self.cursor_tx.borrow().closed
    }

    /// Wait until the log holds more than `seen` events or is closed
    pub async fn wait_for_events(&self, seen: usize) {
        let mut rx = self.cursor_tx.subscribe();
        let _ = rx.wait_for(|cursor| cursor.len > seen || cursor.closed).await;
    }

    /// Replay the log from `since`, then follow new events until the
    /// terminal event or until the log closes
    pub fn event_stream(self: Arc<Self>, since: usize) -> impl Stream<Item = SequencedEvent> {
        stream::unfold((self, since, false), |(handle, next, finished)| async move {
            if finished {
                return None;
            }
            loop {
                if let Some(event) = handle.event_at(next) {
                    let finished = event.event.is_terminal();
                    return Some((event, (handle, next + 1, finished)));
                }
                if handle.events_closed() && handle.event_count() <= next {
                    return None;
                }
                handle.wait_for_events(next).await;
            }
        })
    }
}
