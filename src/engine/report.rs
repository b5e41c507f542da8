//! Run reports
//!
//! One JSON file per finished run, named `llm_run_<n>.json`. The number
//! comes from `llm_run_counter.txt` in the same directory; when that file
//! is missing or unreadable it is recomputed from the existing report
//! names. Reports never contain credentials or profile text, only its
//! length.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use super::types::{BatchDiagnostic, RunState};
use crate::chunker::Chunk;
use crate::scorer::ScoredChunk;
use crate::selector::Selection;

const COUNTER_FILE: &str = "llm_run_counter.txt";
const REPORT_PREFIX: &str = "llm_run_";
const REPORT_SUFFIX: &str = ".json";

#[derive(Debug, Clone, Serialize)]
pub struct ChunkEntry {
    pub ordinal: usize,
    pub page_index: u32,
    pub char_count: usize,
    pub text_preview: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreEntry {
    pub ordinal: usize,
    pub page_index: u32,
    pub relevance: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub rationale_preview: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectedEntry {
    pub ordinal: usize,
    pub page_index: u32,
    pub relevance: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub text_preview: String,
}

/// Everything a report records about one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    pub document_id: String,
    pub pdf_path: String,
    pub scorer: String,
    pub state: RunState,
    pub reason: String,
    pub density_target: f32,
    pub min_threshold: f32,
    pub budget_words: usize,
    pub total_words: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<Vec<u32>>,
    pub profile_present: bool,
    pub document_goal_present: bool,
    pub profile_char_len: usize,
    pub goal_char_len: usize,
    pub chunks: Vec<ChunkEntry>,
    /// Highest relevance first
    pub scores: Vec<ScoreEntry>,
    pub selected: Vec<SelectedEntry>,
    pub diagnostics: Vec<BatchDiagnostic>,
}

impl RunReport {
    pub fn record_batch(&mut self, batch: &[Chunk]) {
        self.chunks.extend(batch.iter().map(|chunk| ChunkEntry {
            ordinal: chunk.ordinal,
            page_index: chunk.page_index,
            char_count: chunk.char_count,
            text_preview: preview(&chunk.text, 500),
        }));
    }

    pub fn record_scores(&mut self, scored: &[ScoredChunk]) {
        self.scores.extend(scored.iter().map(|s| ScoreEntry {
            ordinal: s.chunk.ordinal,
            page_index: s.chunk.page_index,
            relevance: s.score,
            label: s.label.clone(),
            rationale_preview: s.rationale.as_deref().map(|r| preview(r, 300)).unwrap_or_default(),
        }));
    }

    pub fn record_selection(&mut self, selection: &Selection) {
        let chunk = &selection.scored.chunk;
        self.selected.push(SelectedEntry {
            ordinal: chunk.ordinal,
            page_index: chunk.page_index,
            relevance: selection.scored.score,
            note: selection.note.clone(),
            text_preview: preview(&chunk.text, 400),
        });
    }

    /// Sort scores for reading
    pub fn finalize(&mut self) {
        self.scores.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.ordinal.cmp(&b.ordinal))
        });
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Writes numbered run reports into one directory
pub struct ReportWriter {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a report, returning its path
    pub async fn write(&self, report: &RunReport) -> std::io::Result<PathBuf> {
        let _guard = self.lock.lock().await;

        tokio::fs::create_dir_all(&self.dir).await?;
        let number = self.next_number().await?;
        let path = self
            .dir
            .join(format!("{}{}{}", REPORT_PREFIX, number, REPORT_SUFFIX));

        let json = serde_json::to_vec_pretty(report)?;
        tokio::fs::write(&path, json).await?;

        Ok(path)
    }

    async fn next_number(&self) -> std::io::Result<u64> {
        let counter_path = self.dir.join(COUNTER_FILE);

        let current = match tokio::fs::read_to_string(&counter_path).await {
            Ok(raw) => raw.trim().parse::<u64>().ok(),
            Err(_) => None,
        };
        let current = match current {
            Some(n) => n,
            None => self.highest_existing().await?,
        };

        let next = current + 1;
        if let Err(e) = tokio::fs::write(&counter_path, next.to_string()).await {
            tracing::warn!("Failed to update run report counter: {}", e);
        }
        Ok(next)
    }

    async fn highest_existing(&self) -> std::io::Result<u64> {
        let mut highest = 0;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let number = name
                .strip_prefix(REPORT_PREFIX)
                .and_then(|rest| rest.strip_suffix(REPORT_SUFFIX))
                .and_then(|n| n.parse::<u64>().ok());
            if let Some(number) = number {
                highest = highest.max(number);
            }
        }
        Ok(highest)
    }
}
