//! Run Registry
//!
//! Process-wide map from run id to run handle. Starting a run takes the
//! document's exclusive lock just long enough to check for and claim the
//! active-run slot, then hands the run to a background task and returns.
//! Finished runs stay queryable until a retention window passes, or a short
//! grace period after a consumer first saw the terminal state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::Stream;
use tokio::sync::RwLock;

use super::types::{parse_pages, EventSlice, RegistryError, RunHighlights, StartRunRequest};
use crate::config::RegistryConfig;
use crate::documents::valid_density;
use crate::engine::{
    event_channel, RunEngine, RunHandle, RunOptions, RunSnapshot, SequencedEvent,
};

/// Tracks every run the process knows about
#[derive(Clone)]
pub struct RunRegistry {
    inner: Arc<RunRegistryInner>,
}

struct RunRegistryInner {
    runs: RwLock<HashMap<String, Arc<RunHandle>>>,
    engine: RunEngine,
    config: RegistryConfig,
}

impl RunRegistry {
    pub fn new(engine: RunEngine, config: RegistryConfig) -> Self {
        Self {
            inner: Arc::new(RunRegistryInner {
                runs: RwLock::new(HashMap::new()),
                engine,
                config,
            }),
        }
    }

    // ========================================================================
    // Control surface
    // ========================================================================

    /// Start a run; returns as soon as the run is registered
    pub async fn start(
        &self,
        document_id: &str,
        request: StartRunRequest,
    ) -> Result<RunSnapshot, RegistryError> {
        if let Some(density) = request.density_target {
            if !valid_density(density) {
                return Err(RegistryError::InvalidDensity(density));
            }
        }
        let min_threshold = request
            .min_threshold
            .unwrap_or(self.inner.engine.config().min_threshold);
        if !(0.0..=1.0).contains(&min_threshold) {
            return Err(RegistryError::InvalidThreshold(min_threshold));
        }
        let pages = match request.pages.as_deref().map(str::trim) {
            Some(spec) if !spec.is_empty() => Some(parse_pages(spec)?),
            _ => None,
        };

        let handle = {
            let mut guard = self.inner.engine.documents().lock(document_id).await?;

            if let Some(active) = &guard.active_run {
                return Err(RegistryError::AlreadyRunning {
                    document_id: document_id.to_string(),
                    run_id: active.clone(),
                });
            }
            if !guard.document.has_profile() {
                return Err(RegistryError::ProfileIncomplete(document_id.to_string()));
            }

            let options = RunOptions {
                density_target: request
                    .density_target
                    .unwrap_or(guard.document.density_target),
                min_threshold,
                pages,
            };

            let handle = Arc::new(RunHandle::new(document_id));
            guard.active_run = Some(handle.run_id().to_string());
            self.inner
                .runs
                .write()
                .await
                .insert(handle.run_id().to_string(), Arc::clone(&handle));

            self.spawn(Arc::clone(&handle), options);
            handle
        };

        tracing::info!(
            run_id = %handle.run_id(),
            document_id = %document_id,
            "Registered auto-highlight run"
        );

        Ok(handle.snapshot())
    }

    fn spawn(&self, handle: Arc<RunHandle>, options: RunOptions) {
        let (sink, rx) = event_channel(self.inner.engine.config().event_buffer);
        tokio::spawn(Arc::clone(&handle).collect_events(rx));

        let engine = self.inner.engine.clone();
        tokio::spawn(async move {
            engine.execute(handle, options, sink).await;
        });
    }

    /// Current snapshot of a run
    ///
    /// Seeing a terminal state starts the run's post-fetch grace period.
    pub async fn status(&self, document_id: &str, run_id: &str) -> Result<RunSnapshot, RegistryError> {
        let handle = self.get(document_id, run_id).await?;
        let snapshot = handle.snapshot();
        if snapshot.state.is_terminal() {
            handle.update(|r| {
                r.fetched_at.get_or_insert_with(Utc::now);
            });
        }
        Ok(snapshot)
    }

    /// Request cancellation; a no-op on terminal runs
    pub async fn cancel(&self, document_id: &str, run_id: &str) -> Result<RunSnapshot, RegistryError> {
        let handle = self.get(document_id, run_id).await?;

        if handle.state().is_active() && handle.request_cancel() {
            tracing::info!(
                run_id = %run_id,
                document_id = %document_id,
                state = %handle.state(),
                "Cancellation requested"
            );
        }

        Ok(handle.snapshot())
    }

    /// The run's highlights as they currently stand on the document
    pub async fn fetch_highlights(
        &self,
        document_id: &str,
        run_id: &str,
    ) -> Result<RunHighlights, RegistryError> {
        let handle = self.get(document_id, run_id).await?;
        let document = self.inner.engine.documents().get(document_id).await?;
        let snapshot = handle.snapshot();

        Ok(RunHighlights {
            run_id: run_id.to_string(),
            document_id: document_id.to_string(),
            state: snapshot.state,
            partial: snapshot.partial,
            emitted_count: snapshot.emitted_count,
            highlights: document.highlights_for_run(run_id).cloned().collect(),
        })
    }

    /// Logged events from `since` onwards
    pub async fn events(
        &self,
        document_id: &str,
        run_id: &str,
        since: usize,
    ) -> Result<EventSlice, RegistryError> {
        let handle = self.get(document_id, run_id).await?;
        let closed = handle.events_closed();
        let events = handle.events_since(since);
        let next_since = events.last().map(|e| e.seq + 1).unwrap_or(since);

        Ok(EventSlice {
            run_id: run_id.to_string(),
            state: handle.state(),
            complete: closed && next_since >= handle.event_count(),
            events,
            next_since,
        })
    }

    /// Follow a run's events from `since` until its terminal event
    pub async fn subscribe(
        &self,
        document_id: &str,
        run_id: &str,
        since: usize,
    ) -> Result<impl Stream<Item = SequencedEvent>, RegistryError> {
        let handle = self.get(document_id, run_id).await?;
        Ok(handle.event_stream(since))
    }

    /// Wait for a run to reach a terminal state
    pub async fn wait_for_completion(
        &self,
        document_id: &str,
        run_id: &str,
    ) -> Result<RunSnapshot, RegistryError> {
        let handle = self.get(document_id, run_id).await?;
        handle.wait_terminal().await;
        Ok(handle.snapshot())
    }

    /// Runs known for a document, newest first
    pub async fn list(&self, document_id: &str) -> Vec<RunSnapshot> {
        let runs = self.inner.runs.read().await;
        let mut snapshots: Vec<RunSnapshot> = runs
            .values()
            .filter(|h| h.document_id() == document_id)
            .map(|h| h.snapshot())
            .collect();
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        snapshots
    }

    async fn get(&self, document_id: &str, run_id: &str) -> Result<Arc<RunHandle>, RegistryError> {
        let runs = self.inner.runs.read().await;
        runs.get(run_id)
            .filter(|h| h.document_id() == document_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(run_id.to_string()))
    }

    // ========================================================================
    // Retention
    // ========================================================================

    /// Drop finished runs past their retention; returns how many
    pub async fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let retention = Duration::seconds(self.inner.config.retention_secs as i64);
        let grace = Duration::seconds(self.inner.config.fetched_grace_secs as i64);

        let mut runs = self.inner.runs.write().await;
        let before = runs.len();
        runs.retain(|run_id, handle| {
            let expired = handle.update(|r| {
                if r.state.is_active() {
                    return false;
                }
                let fetched = r.fetched_at.map(|at| at + grace <= now).unwrap_or(false);
                let retained = r.completed_at.map(|at| at + retention <= now).unwrap_or(false);
                fetched || retained
            });
            if expired {
                tracing::debug!(run_id = %run_id, "Dropped expired run");
            }
            !expired
        });

        let count = before - runs.len();
        if count > 0 {
            tracing::info!(count = count, "Cleaned up expired runs");
        }
        count
    }

    /// Start a background task that periodically drops expired runs
    pub fn start_cleanup_task(self) -> tokio::task::JoinHandle<()> {
        let period = std::time::Duration::from_secs(self.inner.config.cleanup_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);

            loop {
                interval.tick().await;
                self.cleanup_expired().await;
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.inner.runs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
