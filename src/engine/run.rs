//! Auto-highlight run execution
//!
//! A run walks the document's chunks in page order, scores them in batches,
//! selects within each batch as soon as it is scored, and appends accepted
//! highlights to the document one by one. Cancellation is cooperative: the
//! flag is read before each batch, and a request that arrives while a
//! scoring call is in flight moves the run to `cancelling` until that call
//! settles. Per-batch scoring failures are recorded and skipped; the run
//! fails only when every batch failed or its input is unavailable.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};

use super::handle::{EventSink, RunHandle};
use super::report::{ReportWriter, RunReport};
use super::types::{BatchDiagnostic, RunEvent, RunOptions, RunState};
use crate::annotations::Highlight;
use crate::chunker::{Chunk, Chunker};
use crate::config::EngineConfig;
use crate::documents::DocumentStore;
use crate::extraction::LineCache;
use crate::scorer::{score_batch, Scorer, ScoringContext};
use crate::selector::{word_budget, Selection, Selector};

/// Everything a run needs from the rest of the service
#[derive(Clone)]
pub struct RunEngine {
    inner: Arc<RunEngineInner>,
}

struct RunEngineInner {
    documents: DocumentStore,
    lines: LineCache,
    scorer: Arc<dyn Scorer>,
    chunker: Chunker,
    config: EngineConfig,
    reports: Option<ReportWriter>,
}

/// How a run ended
struct Outcome {
    state: RunState,
    reason: Option<String>,
    /// Short reason recorded in the run report
    label: &'static str,
}

impl Outcome {
    fn completed(label: &'static str) -> Self {
        Self {
            state: RunState::Completed,
            reason: None,
            label,
        }
    }

    fn cancelled() -> Self {
        Self {
            state: RunState::Cancelled,
            reason: None,
            label: "cancelled",
        }
    }

    fn failed(label: &'static str, reason: String) -> Self {
        Self {
            state: RunState::Failed,
            reason: Some(reason),
            label,
        }
    }
}

impl RunEngine {
    pub fn new(
        documents: DocumentStore,
        lines: LineCache,
        scorer: Arc<dyn Scorer>,
        chunker: Chunker,
        config: EngineConfig,
    ) -> Self {
        let reports = config.log_dir.clone().map(ReportWriter::new);

        Self {
            inner: Arc::new(RunEngineInner {
                documents,
                lines,
                scorer,
                chunker,
                config,
                reports,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.inner.documents
    }

    /// Execute a run to a terminal state
    ///
    /// `run` must be registered as the document's active run before this is
    /// called; the terminal transition clears it.
    pub async fn execute(&self, run: Arc<RunHandle>, options: RunOptions, events: EventSink) {
        let mut report = self.new_report(&run, &options);

        let outcome = if run.is_cancel_requested() {
            Outcome::cancelled()
        } else {
            self.transition(&run, &events, RunState::Running).await;
            tracing::info!(
                run_id = %run.run_id(),
                document_id = %run.document_id(),
                density_target = options.density_target,
                min_threshold = options.min_threshold,
                "Auto-highlight run started"
            );
            self.process(&run, &options, &events, report.as_mut()).await
        };

        self.finish(&run, &events, outcome, report).await;
    }

    async fn process(
        &self,
        run: &Arc<RunHandle>,
        options: &RunOptions,
        events: &EventSink,
        mut report: Option<&mut RunReport>,
    ) -> Outcome {
        let inner = &self.inner;

        let (pdf_path, context) = match inner.documents.get(run.document_id()).await {
            Ok(document) => (
                document.pdf_path,
                ScoringContext::new(
                    document.global_profile.unwrap_or_default(),
                    document.document_goal.unwrap_or_default(),
                ),
            ),
            Err(e) => return Outcome::failed("document_unavailable", e.to_string()),
        };

        if let Some(report) = report.as_deref_mut() {
            report.pdf_path = pdf_path.clone();
            report.profile_present = !context.global_profile.trim().is_empty();
            report.document_goal_present = !context.document_goal.trim().is_empty();
            report.profile_char_len = context.global_profile.chars().count();
            report.goal_char_len = context.document_goal.chars().count();
        }

        let lines = match inner.lines.lines(run.document_id(), &pdf_path).await {
            Ok(lines) => lines,
            Err(e) => {
                return Outcome::failed(
                    "extraction_failed",
                    format!("Text extraction failed: {}", e),
                )
            }
        };

        // First pass sizes the run; chunking is restartable
        let (total_chunks, total_words) = inner
            .chunker
            .chunks(&lines)
            .filter(|c| options.includes_page(c.page_index))
            .fold((0usize, 0usize), |(n, words), c| (n + 1, words + c.word_count));

        let batch_size = inner.config.batch_size.max(1);
        let batches_total = total_chunks.div_ceil(batch_size);
        run.update(|r| {
            r.total_chunks = total_chunks;
            r.batches_total = batches_total;
        });

        if total_chunks == 0 {
            tracing::info!(run_id = %run.run_id(), "No text chunks to score");
            return Outcome::completed("no_chunks_extracted");
        }

        let budget = word_budget(
            options.density_target,
            total_words,
            inner.config.soft_cap_multiplier,
        );
        let mut selector = Selector::new(options.min_threshold, budget);
        if let Some(report) = report.as_deref_mut() {
            report.total_words = total_words;
            report.budget_words = budget;
        }

        tracing::debug!(
            run_id = %run.run_id(),
            total_chunks,
            total_words,
            budget_words = budget,
            batches = batches_total,
            "Prepared chunk batches"
        );

        let mut chunks = inner
            .chunker
            .chunks(&lines)
            .filter(|c| options.includes_page(c.page_index));
        let batches = std::iter::from_fn(move || {
            let batch: Vec<Chunk> = chunks.by_ref().take(batch_size).collect();
            (!batch.is_empty()).then_some(batch)
        });

        let scorer = inner.scorer.as_ref();
        let context = &context;
        let mut scored_batches = stream::iter(batches.enumerate())
            .map(|(index, batch)| async move {
                let result = score_batch(scorer, &batch, context).await;
                (index, batch, result)
            })
            .buffered(inner.config.scoring_concurrency.max(1));

        let mut all_scored = Vec::new();
        let mut batches_scored = 0usize;
        let mut last_error: Option<String> = None;
        let mut cancelling = false;

        loop {
            if run.is_cancel_requested() {
                return Outcome::cancelled();
            }

            let next = tokio::select! {
                biased;
                item = scored_batches.next() => item,
                _ = run.cancelled() => {
                    cancelling = true;
                    self.transition(run, events, RunState::Cancelling).await;
                    tracing::info!(run_id = %run.run_id(), "Cancellation requested, settling in-flight batch");
                    scored_batches.next().await
                }
            };

            let Some((index, batch, result)) = next else {
                if cancelling {
                    return Outcome::cancelled();
                }
                break;
            };
            if let Some(report) = report.as_deref_mut() {
                report.record_batch(&batch);
            }

            match result {
                Ok(scores) => {
                    batches_scored += 1;
                    if !scores.is_complete() {
                        let message = format!(
                            "{} of {} chunks unscored, {} entries ignored",
                            scores.missing,
                            batch.len(),
                            scores.ignored
                        );
                        tracing::warn!(run_id = %run.run_id(), batch = index, "Partial scoring response: {}", message);
                        self.diagnose(run, index, &batch, "scoring_malformed", message, true);
                    }

                    let selections = selector.select_batch(&scores.scored);
                    tracing::debug!(
                        run_id = %run.run_id(),
                        batch = index,
                        accepted = selections.len(),
                        remaining_words = selector.remaining_words(),
                        "Batch scored"
                    );

                    if let Some(report) = report.as_deref_mut() {
                        report.record_scores(&scores.scored);
                    }
                    for selection in selections {
                        if let Some(report) = report.as_deref_mut() {
                            report.record_selection(&selection);
                        }
                        self.accept(run, events, selection).await;
                    }
                    all_scored.extend(scores.scored);
                }
                Err(e) => {
                    tracing::warn!(run_id = %run.run_id(), batch = index, "Batch skipped: {}", e);
                    run.update(|r| r.batches_failed += 1);
                    self.diagnose(run, index, &batch, e.kind(), e.to_string(), false);
                    last_error = Some(e.to_string());
                }
            }

            let (processed, total) = run.update(|r| {
                r.processed_chunks += batch.len();
                (r.processed_chunks, r.total_chunks)
            });
            events
                .emit(RunEvent::Progress {
                    run_id: run.run_id().to_string(),
                    processed_chunk_count: processed,
                    total_chunk_count_estimate: total,
                })
                .await;

            if cancelling {
                return Outcome::cancelled();
            }
        }

        if batches_scored == 0 {
            return Outcome::failed(
                "all_batches_failed",
                format!(
                    "All {} scoring batches failed: {}",
                    batches_total,
                    last_error.unwrap_or_default()
                ),
            );
        }

        if let Some(selection) = selector.fallback(&all_scored) {
            tracing::info!(run_id = %run.run_id(), "No chunk fit the budget, accepting best chunk");
            if let Some(report) = report.as_deref_mut() {
                report.record_selection(&selection);
            }
            self.accept(run, events, selection).await;
            return Outcome::completed("fallback_used");
        }

        Outcome::completed(if selector.accepted_count() > 0 { "ok" } else { "no_selection" })
    }

    /// Append a highlight under the document lock, save, then announce it
    async fn accept(&self, run: &RunHandle, events: &EventSink, selection: Selection) {
        let highlight: Highlight = selection.into_highlight(run.run_id());

        let mut guard = match self.inner.documents.lock(run.document_id()).await {
            Ok(guard) => guard,
            Err(e) => {
                tracing::warn!(run_id = %run.run_id(), "Dropping highlight: {}", e);
                return;
            }
        };
        guard.document.add_highlight(highlight.clone());
        run.update(|r| r.emitted_count += 1);
        self.inner.documents.commit(guard).await;

        events
            .emit(RunEvent::Highlight {
                run_id: run.run_id().to_string(),
                highlight,
            })
            .await;
    }

    fn diagnose(
        &self,
        run: &RunHandle,
        batch_index: usize,
        batch: &[Chunk],
        kind: &str,
        message: String,
        recovered: bool,
    ) {
        let diagnostic = BatchDiagnostic {
            batch_index,
            first_chunk: batch.first().map(|c| c.ordinal).unwrap_or_default(),
            chunk_count: batch.len(),
            kind: kind.to_string(),
            message,
            recovered,
            at: Utc::now(),
        };
        run.update(|r| r.diagnostics.push(diagnostic));
    }

    async fn transition(&self, run: &RunHandle, events: &EventSink, next: RunState) {
        if run.transition(next, None) {
            events
                .emit(RunEvent::StateChanged {
                    run_id: run.run_id().to_string(),
                    new_state: next,
                    reason: None,
                })
                .await;
        }
    }

    /// Terminal transition: made under the document lock together with
    /// releasing the document's active-run slot
    async fn finish(
        &self,
        run: &Arc<RunHandle>,
        events: &EventSink,
        outcome: Outcome,
        report: Option<RunReport>,
    ) {
        let moved = match self.inner.documents.lock(run.document_id()).await {
            Ok(mut guard) => {
                let moved = run.transition(outcome.state, outcome.reason.clone());
                if guard.active_run.as_deref() == Some(run.run_id()) {
                    guard.active_run = None;
                }
                self.inner.documents.commit(guard).await;
                moved
            }
            Err(_) => run.transition(outcome.state, outcome.reason.clone()),
        };

        if moved {
            events
                .emit(RunEvent::StateChanged {
                    run_id: run.run_id().to_string(),
                    new_state: outcome.state,
                    reason: outcome.reason.clone(),
                })
                .await;
        }

        let snapshot = run.snapshot();
        match outcome.state {
            RunState::Failed => tracing::warn!(
                run_id = %run.run_id(),
                reason = outcome.reason.as_deref().unwrap_or_default(),
                batches_failed = snapshot.batches_failed,
                "Auto-highlight run failed"
            ),
            state => tracing::info!(
                run_id = %run.run_id(),
                state = %state,
                emitted = snapshot.emitted_count,
                batches_failed = snapshot.batches_failed,
                "Auto-highlight run finished"
            ),
        }

        if let (Some(writer), Some(mut report)) = (self.inner.reports.as_ref(), report) {
            report.state = outcome.state;
            report.reason = outcome.label.to_string();
            report.diagnostics = snapshot.diagnostics;
            report.finalize();
            match writer.write(&report).await {
                Ok(path) => tracing::debug!(run_id = %run.run_id(), path = %path.display(), "Wrote run report"),
                Err(e) => tracing::warn!(run_id = %run.run_id(), "Failed to write run report: {}", e),
            }
        }
    }

    fn new_report(&self, run: &RunHandle, options: &RunOptions) -> Option<RunReport> {
        self.inner.reports.as_ref()?;

        Some(RunReport {
            timestamp: Utc::now(),
            run_id: run.run_id().to_string(),
            document_id: run.document_id().to_string(),
            pdf_path: String::new(),
            scorer: self.inner.scorer.name().to_string(),
            state: RunState::Pending,
            reason: String::new(),
            density_target: options.density_target,
            min_threshold: options.min_threshold,
            budget_words: 0,
            total_words: 0,
            pages: options.pages.as_ref().map(|p| p.iter().copied().collect()),
            profile_present: false,
            document_goal_present: false,
            profile_char_len: 0,
            goal_char_len: 0,
            chunks: Vec::new(),
            scores: Vec::new(),
            selected: Vec::new(),
            diagnostics: Vec::new(),
        })
    }
}
