//! Tolerant score parsing and batch alignment
//!
//! Models sometimes wrap the JSON list in prose or stop mid-object when
//! they hit the token limit. Parsing takes the outermost `[...]` when one
//! exists and otherwise salvages every complete top-level object.

use serde_json::Value;

use super::types::{BatchScores, RawScore, ScoredChunk, ScorerError};
use crate::chunker::Chunk;

/// Parse a raw model reply into score entries
pub fn parse_scores(raw: &str) -> Result<Vec<RawScore>, ScorerError> {
    let first = raw.find('[');
    let last = raw.rfind(']');

    let snippet = match (first, last) {
        (Some(f), Some(l)) if l > f => &raw[f..=l],
        _ => raw,
    };

    let items = match serde_json::from_str::<Vec<Value>>(snippet) {
        Ok(items) => items,
        Err(err) => {
            let work = match first {
                Some(f) => &raw[f + 1..],
                None => raw,
            };
            let recovered = recover_objects(work);
            if recovered.is_empty() {
                return Err(ScorerError::Malformed(format!(
                    "unable to parse scores: {}",
                    err
                )));
            }
            tracing::debug!(recovered = recovered.len(), "Recovered truncated score list");
            recovered
        }
    };

    Ok(items.iter().filter_map(entry_from_value).collect())
}

/// Collect every complete top-level `{...}` object, stopping at a closing `]`
fn recover_objects(work: &str) -> Vec<Value> {
    let mut objects = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut depth = 0usize;
    let mut start = None;

    for (i, ch) in work.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        if let Ok(value) = serde_json::from_str::<Value>(&work[s..=i]) {
                            objects.push(value);
                        }
                    }
                }
            }
            ']' if depth == 0 => break,
            _ => {}
        }
    }

    objects
}

fn entry_from_value(value: &Value) -> Option<RawScore> {
    let id = number(value.get("id")?)?;
    let relevance = number(value.get("relevance")?)?;
    if id.fract() != 0.0 {
        return None;
    }

    let text = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    Some(RawScore {
        id: id as i64,
        relevance,
        rationale: text("rationale"),
        label: text("phrase"),
    })
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Clamp a reported relevance into [0, 1]
pub fn clamp_relevance(relevance: f64) -> f32 {
    if relevance.is_nan() {
        return 0.0;
    }
    relevance.clamp(0.0, 1.0) as f32
}

/// Match score entries to batch positions
///
/// Unmatched positions score 0 with no label. Out-of-range and repeated
/// ids are ignored. A non-empty batch where nothing matched is malformed.
pub fn align(batch: &[Chunk], entries: Vec<RawScore>) -> Result<BatchScores, ScorerError> {
    let mut slots: Vec<Option<RawScore>> = vec![None; batch.len()];
    let mut ignored = 0;

    for entry in entries {
        let slot = usize::try_from(entry.id)
            .ok()
            .and_then(|position| slots.get_mut(position));
        match slot {
            Some(slot) if slot.is_none() => *slot = Some(entry),
            _ => ignored += 1,
        }
    }

    let matched = slots.iter().filter(|s| s.is_some()).count();
    if !batch.is_empty() && matched == 0 {
        return Err(ScorerError::Malformed(format!(
            "no score matched any of {} chunks ({} entries ignored)",
            batch.len(),
            ignored
        )));
    }

    let scored = batch
        .iter()
        .zip(slots)
        .map(|(chunk, slot)| match slot {
            Some(entry) => ScoredChunk {
                chunk: chunk.clone(),
                score: clamp_relevance(entry.relevance),
                label: entry.label,
                rationale: entry.rationale,
            },
            None => ScoredChunk::unscored(chunk.clone()),
        })
        .collect();

    Ok(BatchScores {
        scored,
        missing: batch.len() - matched,
        ignored,
    })
}
