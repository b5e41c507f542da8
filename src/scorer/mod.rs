//! Scorer client
//!
//! Sends batches of chunks to a relevance scoring service and lines the
//! replies up with the batch they answer.
//!
//! - `AzureOpenAiScorer` talks to an Azure OpenAI chat deployment.
//! - `DisabledScorer` stands in when no credentials are configured; every
//!   batch fails as unavailable.

mod azure;
mod parse;
mod types;

use std::sync::Arc;

use async_trait::async_trait;

pub use azure::{AzureOpenAiScorer, AzureOpenAiSettings, MAX_CHUNK_TEXT_CHARS};
pub use parse::{align, clamp_relevance, parse_scores};
pub use types::{BatchScores, RawScore, ScoredChunk, Scorer, ScorerError, ScoringContext};

use crate::chunker::Chunk;
use crate::config::ScorerConfig;

/// Scorer used when the service is not configured
#[derive(Debug, Clone, Default)]
pub struct DisabledScorer;

#[async_trait]
impl Scorer for DisabledScorer {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn score(
        &self,
        _batch: &[Chunk],
        _context: &ScoringContext,
    ) -> Result<Vec<RawScore>, ScorerError> {
        Err(ScorerError::Unavailable(
            "Scoring service is not configured".to_string(),
        ))
    }
}

/// Score one batch and align the reply with it
pub async fn score_batch(
    scorer: &dyn Scorer,
    batch: &[Chunk],
    context: &ScoringContext,
) -> Result<BatchScores, ScorerError> {
    let entries = scorer.score(batch, context).await?;
    align(batch, entries)
}

/// Build the scorer described by configuration
pub fn build_scorer(config: &ScorerConfig) -> Arc<dyn Scorer> {
    let (endpoint, api_key) = match (&config.endpoint, &config.api_key) {
        (Some(endpoint), Some(api_key)) if !endpoint.is_empty() && !api_key.is_empty() => {
            (endpoint.clone(), api_key.clone())
        }
        _ => {
            tracing::warn!("Azure OpenAI credentials not set; auto-highlight runs will fail");
            return Arc::new(DisabledScorer);
        }
    };

    let settings = AzureOpenAiSettings {
        endpoint,
        api_key,
        deployment: config.deployment.clone(),
        api_version: config.api_version.clone(),
        max_tokens: config.max_tokens,
        timeout_secs: config.timeout_secs,
    };

    match AzureOpenAiScorer::new(settings) {
        Ok(scorer) => {
            tracing::info!(deployment = %config.deployment, "Azure OpenAI scorer configured");
            Arc::new(scorer)
        }
        Err(e) => {
            tracing::error!("Failed to initialize Azure OpenAI scorer: {}", e);
            Arc::new(DisabledScorer)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_scorer_is_unavailable() {
        let err = DisabledScorer
            .score(&[], &ScoringContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "scoring_unavailable");
    }

    #[tokio::test]
    async fn test_build_scorer_without_credentials() {
        let scorer = build_scorer(&ScorerConfig::default());
        assert_eq!(scorer.name(), "disabled");
    }

    #[tokio::test]
    async fn test_score_batch_aligns_reply() {
        use crate::annotations::Rect;

        let chunk = Chunk {
            ordinal: 0,
            page_index: 0,
            rects: vec![Rect::new(0.0, 0.0, 1.0, 1.0)],
            text: "words here\n".to_string(),
            char_count: 11,
            word_count: 2,
        };
        let scorer = mock::ScriptedScorer::constant(0.7);
        let scores = score_batch(&scorer, &[chunk.clone(), chunk], &ScoringContext::default())
            .await
            .unwrap();
        assert!(scores.is_complete());
        assert_eq!(scores.scored[1].score, 0.7);
    }
}
