//! Scorer contract types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chunker::Chunk;

/// Reader context sent with every batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringContext {
    pub global_profile: String,
    pub document_goal: String,
}

impl ScoringContext {
    pub fn new(global_profile: impl Into<String>, document_goal: impl Into<String>) -> Self {
        Self {
            global_profile: global_profile.into(),
            document_goal: document_goal.into(),
        }
    }
}

/// One entry of a scoring response, keyed by position in the batch
#[derive(Debug, Clone, PartialEq)]
pub struct RawScore {
    pub id: i64,
    pub relevance: f64,
    pub rationale: Option<String>,
    /// Short 1-4 word label
    pub label: Option<String>,
}

impl RawScore {
    pub fn new(id: i64, relevance: f64) -> Self {
        Self {
            id,
            relevance,
            rationale: None,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// A chunk with its relevance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Relevance in [0, 1]
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl ScoredChunk {
    pub fn unscored(chunk: Chunk) -> Self {
        Self {
            chunk,
            score: 0.0,
            label: None,
            rationale: None,
        }
    }
}

/// Result of aligning a response with its batch
#[derive(Debug, Clone)]
pub struct BatchScores {
    /// Same length and order as the submitted batch
    pub scored: Vec<ScoredChunk>,
    /// Batch positions that received no score
    pub missing: usize,
    /// Entries that matched no batch position, or repeated one
    pub ignored: usize,
}

impl BatchScores {
    /// Whether the response lined up exactly with the batch
    pub fn is_complete(&self) -> bool {
        self.missing == 0 && self.ignored == 0
    }
}

/// Scoring errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScorerError {
    /// Network failure, timeout or error status from the service
    #[error("Scoring unavailable: {0}")]
    Unavailable(String),

    /// Response could not be read as scores
    #[error("Scoring response malformed: {0}")]
    Malformed(String),
}

impl ScorerError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "scoring_unavailable",
            Self::Malformed(_) => "scoring_malformed",
        }
    }
}

/// Relevance scoring service
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Name used in logs and run reports
    fn name(&self) -> &str;

    /// Score a batch; entry ids refer to positions in `batch`
    async fn score(
        &self,
        batch: &[Chunk],
        context: &ScoringContext,
    ) -> Result<Vec<RawScore>, ScorerError>;
}
