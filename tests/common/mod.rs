//! Shared fixtures for integration tests
//!
//! In-memory line sources and scripted scorers standing in for MuPDF and
//! the scoring service.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};

use reading_copilot_server::annotations::{Document, Rect, SqliteDocumentStore};
use reading_copilot_server::chunker::{Chunk, Chunker};
use reading_copilot_server::config::{EngineConfig, RegistryConfig};
use reading_copilot_server::documents::DocumentStore;
use reading_copilot_server::engine::RunEngine;
use reading_copilot_server::extraction::{ExtractionError, LineCache, LineSource, TextLine};
use reading_copilot_server::registry::RunRegistry;
use reading_copilot_server::scorer::{RawScore, Scorer, ScorerError, ScoringContext};

// ============================================================================
// Line sources
// ============================================================================

/// One paragraph per line; paragraphs are far enough apart that every line
/// becomes its own chunk
pub struct PagedLines {
    pages: Vec<Vec<String>>,
}

impl PagedLines {
    pub fn new(pages: Vec<Vec<&str>>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|page| page.into_iter().map(str::to_string).collect())
                .collect(),
        }
    }

    /// `count` paragraphs of four words each on one page
    pub fn uniform(count: usize) -> Self {
        let paragraphs: Vec<String> = (0..count)
            .map(|i| format!("Accelerator economics section {}", i))
            .collect();
        Self {
            pages: vec![paragraphs],
        }
    }
}

impl LineSource for PagedLines {
    fn page_count(&self, _pdf_path: &str) -> Result<u32, ExtractionError> {
        Ok(self.pages.len() as u32)
    }

    fn extract_lines(&self, _pdf_path: &str) -> Result<Vec<TextLine>, ExtractionError> {
        let mut lines = Vec::new();
        for (page_index, page) in self.pages.iter().enumerate() {
            for (i, text) in page.iter().enumerate() {
                let top = 72.0 + i as f32 * 40.0;
                lines.push(TextLine::new(
                    page_index as u32,
                    format!("{}\n", text),
                    Rect::new(72.0, top, 520.0, top + 11.0),
                ));
            }
        }
        Ok(lines)
    }
}

/// A PDF that cannot be read
pub struct BrokenLines;

impl LineSource for BrokenLines {
    fn page_count(&self, pdf_path: &str) -> Result<u32, ExtractionError> {
        Err(ExtractionError::NotFound(pdf_path.to_string()))
    }

    fn extract_lines(&self, pdf_path: &str) -> Result<Vec<TextLine>, ExtractionError> {
        Err(ExtractionError::Open(pdf_path.to_string()))
    }
}

// ============================================================================
// Scorers
// ============================================================================

/// Replies come from a script, one per call; once the script runs out every
/// chunk scores `fallback`
pub struct ScriptedScorer {
    script: Mutex<VecDeque<Result<Vec<RawScore>, ScorerError>>>,
    /// `None` fails every unscripted call
    fallback: Option<f64>,
    calls: AtomicUsize,
}

impl ScriptedScorer {
    pub fn new(script: Vec<Result<Vec<RawScore>, ScorerError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: Some(0.0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn constant(relevance: f64) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(relevance),
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call fails with `ScoringUnavailable`
    pub fn unavailable() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Scorer for ScriptedScorer {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn score(
        &self,
        batch: &[Chunk],
        _context: &ScoringContext,
    ) -> Result<Vec<RawScore>, ScorerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reply) = self.script.lock().pop_front() {
            return reply;
        }
        let relevance = self
            .fallback
            .ok_or_else(|| ScorerError::Unavailable("connection refused".to_string()))?;
        Ok((0..batch.len())
            .map(|i| RawScore::new(i as i64, relevance))
            .collect())
    }
}

/// Holds every call until the test releases it
pub struct GatedScorer {
    relevance: f64,
    gate: Semaphore,
    entered: Notify,
    calls: AtomicUsize,
}

impl GatedScorer {
    pub fn new(relevance: f64) -> Self {
        Self {
            relevance,
            gate: Semaphore::new(0),
            entered: Notify::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Let `n` held or future calls return
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Wait until at least `n` calls have started
    pub async fn wait_for_calls(&self, n: usize) {
        loop {
            let entered = self.entered.notified();
            tokio::pin!(entered);
            entered.as_mut().enable();
            if self.calls.load(Ordering::SeqCst) >= n {
                return;
            }
            entered.await;
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Scorer for GatedScorer {
    fn name(&self) -> &str {
        "gated"
    }

    async fn score(
        &self,
        batch: &[Chunk],
        _context: &ScoringContext,
    ) -> Result<Vec<RawScore>, ScorerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_waiters();

        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| ScorerError::Unavailable("gate closed".to_string()))?;
        permit.forget();

        Ok((0..batch.len())
            .map(|i| RawScore::new(i as i64, self.relevance))
            .collect())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub documents: DocumentStore,
    pub engine: RunEngine,
    pub registry: RunRegistry,
    pub document_id: String,
    pub persistence: SqliteDocumentStore,
}

pub fn engine_config(batch_size: usize) -> EngineConfig {
    EngineConfig {
        batch_size,
        ..EngineConfig::default()
    }
}

/// A document with a complete profile, over `source`, scored by `scorer`
pub async fn harness(
    source: Arc<dyn LineSource>,
    scorer: Arc<dyn Scorer>,
    config: EngineConfig,
) -> Harness {
    let persistence = SqliteDocumentStore::in_memory().await.unwrap();
    let documents = DocumentStore::new(Arc::new(persistence.clone()));

    let mut document = Document::new("pitch-deck.pdf", "/data/pitch-deck.pdf");
    document.global_profile = Some("Early-stage investor focused on hardware".to_string());
    document.document_goal = Some("Judge the accelerator business model".to_string());
    document.page_count = Some(source.page_count("/data/pitch-deck.pdf").unwrap_or(1));
    let document_id = documents.insert(document).await.id;

    let engine = RunEngine::new(
        documents.clone(),
        LineCache::new(source),
        scorer,
        Chunker::default(),
        config,
    );
    let registry = RunRegistry::new(engine.clone(), RegistryConfig::default());

    Harness {
        documents,
        engine,
        registry,
        document_id,
        persistence,
    }
}
