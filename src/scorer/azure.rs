//! Azure OpenAI chat-completions scorer

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::parse::parse_scores;
use super::types::{RawScore, Scorer, ScorerError, ScoringContext};
use crate::chunker::Chunk;

/// Longest chunk text sent to the model
pub const MAX_CHUNK_TEXT_CHARS: usize = 1600;

const SYSTEM_PROMPT: &str = "You rate PDF text chunks for how useful they are to a reader with the \
given background and goal for this document. Reply with ONLY a JSON list of objects with the keys \
id (integer, copied from the chunk), relevance (number from 0 to 1), rationale (at most 25 words) \
and phrase (one short label of 1 to 4 words naming what the chunk is about, no quotes and no \
trailing punctuation). Do not write anything before or after the JSON.";

/// Connection settings for an Azure OpenAI deployment
#[derive(Debug, Clone)]
pub struct AzureOpenAiSettings {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

/// Scorer backed by an Azure OpenAI chat deployment
pub struct AzureOpenAiScorer {
    client: reqwest::Client,
    settings: AzureOpenAiSettings,
}

impl AzureOpenAiScorer {
    pub fn new(settings: AzureOpenAiSettings) -> Result<Self, ScorerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()
            .map_err(|e| ScorerError::Unavailable(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, settings })
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.settings.endpoint.trim_end_matches('/'),
            self.settings.deployment,
            self.settings.api_version
        )
    }

    fn request_body(&self, batch: &[Chunk], context: &ScoringContext) -> serde_json::Value {
        let chunks: Vec<serde_json::Value> = batch
            .iter()
            .enumerate()
            .map(|(position, chunk)| {
                let text: String = chunk.text.chars().take(MAX_CHUNK_TEXT_CHARS).collect();
                json!({ "id": position, "text": text })
            })
            .collect();

        let user = json!({
            "global_profile": context.global_profile.trim(),
            "document_goal": context.document_goal.trim(),
            "chunks": chunks,
        });

        json!({
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": user.to_string() },
            ],
            "temperature": 0,
            "max_tokens": self.settings.max_tokens,
            "n": 1,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl Scorer for AzureOpenAiScorer {
    fn name(&self) -> &str {
        "azure-openai"
    }

    async fn score(
        &self,
        batch: &[Chunk],
        context: &ScoringContext,
    ) -> Result<Vec<RawScore>, ScorerError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(self.url())
            .header("api-key", &self.settings.api_key)
            .json(&self.request_body(batch, context))
            .send()
            .await
            .map_err(|e| ScorerError::Unavailable(format!("Azure OpenAI request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(400).collect();
            return Err(ScorerError::Unavailable(format!(
                "Azure OpenAI returned {}: {}",
                status, body
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ScorerError::Unavailable(format!("Failed to read response: {}", e)))?;

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| ScorerError::Malformed(format!("Unexpected response format: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ScorerError::Malformed("Response has no message content".to_string()))?;

        parse_scores(&content)
    }
}
