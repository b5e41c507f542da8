//! Selector
//!
//! Decides which scored chunks become highlights. Selection is incremental:
//! each scored batch is considered once, in descending score order, and
//! accepted greedily until a chunk falls below the relevance threshold or
//! would overrun the remaining word budget. This trades a little optimality
//! for early results; no global re-optimisation is done after the run.

mod keywords;

use std::cmp::Ordering;

pub use keywords::{extract_keywords, keyword_note, MAX_KEYWORDS};

use crate::annotations::Highlight;
use crate::scorer::ScoredChunk;

/// Default minimum relevance for acceptance
pub const DEFAULT_MIN_THRESHOLD: f32 = 0.60;

/// Word budget for a density target
///
/// `floor(density * total_words * soft_cap)`, never below one word.
pub fn word_budget(density: f32, total_words: usize, soft_cap_multiplier: f32) -> usize {
    let raw = f64::from(density) * total_words as f64 * f64::from(soft_cap_multiplier);
    if raw.is_finite() && raw >= 1.0 {
        raw.floor() as usize
    } else {
        1
    }
}

/// A chunk the selector accepted, with the note its highlight will carry
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub scored: ScoredChunk,
    pub note: Option<String>,
}

impl Selection {
    fn new(scored: ScoredChunk) -> Self {
        let note = scored
            .label
            .clone()
            .or_else(|| keyword_note(&scored.chunk.text));
        Self { scored, note }
    }

    pub fn into_highlight(self, run_id: &str) -> Highlight {
        let chunk = self.scored.chunk;
        Highlight::auto_generated(
            run_id,
            chunk.page_index,
            chunk.rects,
            self.scored.score,
            self.note,
            &chunk.text,
        )
    }
}

/// Descending score, then lower page, then earlier chunk
fn by_preference(a: &ScoredChunk, b: &ScoredChunk) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then(a.chunk.page_index.cmp(&b.chunk.page_index))
        .then(a.chunk.ordinal.cmp(&b.chunk.ordinal))
}

/// Incremental budgeted selector for one run
#[derive(Debug, Clone)]
pub struct Selector {
    threshold: f32,
    budget_words: usize,
    accepted_words: usize,
    accepted_count: usize,
}

impl Selector {
    pub fn new(threshold: f32, budget_words: usize) -> Self {
        Self {
            threshold,
            budget_words,
            accepted_words: 0,
            accepted_count: 0,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn budget_words(&self) -> usize {
        self.budget_words
    }

    pub fn accepted_words(&self) -> usize {
        self.accepted_words
    }

    pub fn accepted_count(&self) -> usize {
        self.accepted_count
    }

    pub fn remaining_words(&self) -> usize {
        self.budget_words.saturating_sub(self.accepted_words)
    }

    /// Select from one scored batch; the result is in page order
    pub fn select_batch(&mut self, batch: &[ScoredChunk]) -> Vec<Selection> {
        let mut candidates: Vec<&ScoredChunk> = batch.iter().collect();
        candidates.sort_by(|a, b| by_preference(a, b));

        let mut accepted: Vec<Selection> = Vec::new();
        for candidate in candidates {
            if candidate.score < self.threshold {
                break;
            }
            if candidate.chunk.word_count > self.remaining_words() {
                break;
            }
            self.accepted_words += candidate.chunk.word_count;
            self.accepted_count += 1;
            accepted.push(Selection::new(candidate.clone()));
        }

        accepted.sort_by(|a, b| {
            a.scored
                .chunk
                .page_index
                .cmp(&b.scored.chunk.page_index)
                .then(a.scored.chunk.ordinal.cmp(&b.scored.chunk.ordinal))
        });
        accepted
    }

    /// The single best chunk of a run that accepted nothing, if it meets the
    /// threshold; ignores the budget
    pub fn fallback(&mut self, scored: &[ScoredChunk]) -> Option<Selection> {
        if self.accepted_count > 0 {
            return None;
        }
        let best = scored.iter().min_by(|a, b| by_preference(a, b))?;
        if best.score < self.threshold {
            return None;
        }
        self.accepted_words += best.chunk.word_count;
        self.accepted_count += 1;
        Some(Selection::new(best.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{HighlightOrigin, Rect};
    use crate::chunker::Chunk;

    fn scored(ordinal: usize, page: u32, words: usize, score: f32) -> ScoredChunk {
        let text = vec!["word"; words].join(" ");
        ScoredChunk {
            chunk: Chunk {
                ordinal,
                page_index: page,
                rects: vec![Rect::new(0.0, ordinal as f32 * 20.0, 100.0, ordinal as f32 * 20.0 + 10.0)],
                char_count: text.len(),
                word_count: words,
                text,
            },
            score,
            label: None,
            rationale: None,
        }
    }

    #[test]
    fn test_word_budget() {
        assert_eq!(word_budget(0.1, 1000, 1.0), 100);
        assert_eq!(word_budget(0.1, 1000, 2.0), 200);
        assert_eq!(word_budget(0.1, 5, 1.0), 1);
        assert_eq!(word_budget(0.15, 99, 1.0), 14);
    }

    #[test]
    fn test_below_threshold_rejected_regardless_of_budget() {
        let batch = vec![scored(0, 0, 10, 0.9), scored(1, 0, 10, 0.2), scored(2, 1, 10, 0.8)];
        let mut selector = Selector::new(0.5, 20);

        let accepted = selector.select_batch(&batch);
        let ordinals: Vec<usize> = accepted.iter().map(|s| s.scored.chunk.ordinal).collect();

        assert_eq!(ordinals, vec![0, 2]);
        assert_eq!(selector.accepted_words(), 20);
        assert_eq!(selector.remaining_words(), 0);
    }

    #[test]
    fn test_budget_stops_acceptance() {
        let batch = vec![scored(0, 0, 10, 0.7), scored(1, 0, 30, 0.95), scored(2, 0, 5, 0.9)];
        let mut selector = Selector::new(0.5, 20);

        let accepted = selector.select_batch(&batch);

        // 0.95 (30 words) does not fit, which ends the batch
        assert!(accepted.is_empty());

        let mut selector = Selector::new(0.5, 40);
        let accepted = selector.select_batch(&batch);
        let ordinals: Vec<usize> = accepted.iter().map(|s| s.scored.chunk.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2]);
    }

    #[test]
    fn test_budget_carries_across_batches() {
        let mut selector = Selector::new(0.5, 15);
        assert_eq!(selector.select_batch(&[scored(0, 0, 10, 0.9)]).len(), 1);
        assert!(selector.select_batch(&[scored(1, 1, 10, 0.99)]).is_empty());
        assert_eq!(selector.select_batch(&[scored(2, 2, 5, 0.6)]).len(), 1);
        assert_eq!(selector.remaining_words(), 0);
    }

    #[test]
    fn test_ties_prefer_lower_page_and_output_is_page_ordered() {
        let batch = vec![scored(3, 2, 10, 0.8), scored(1, 1, 10, 0.8), scored(0, 0, 10, 0.9)];
        let mut selector = Selector::new(0.5, 20);

        let accepted = selector.select_batch(&batch);
        let pages: Vec<u32> = accepted.iter().map(|s| s.scored.chunk.page_index).collect();
        assert_eq!(pages, vec![0, 1]);
    }

    #[test]
    fn test_note_prefers_label_then_keywords() {
        let mut labelled = scored(0, 0, 3, 0.9);
        labelled.label = Some("GPU Roadmap".to_string());
        let mut plain = scored(1, 0, 3, 0.9);
        plain.chunk.text = "Accelerator revenue accelerator".to_string();

        let mut selector = Selector::new(0.5, 100);
        let accepted = selector.select_batch(&[labelled, plain]);

        assert_eq!(accepted[0].note.as_deref(), Some("GPU Roadmap"));
        assert_eq!(accepted[1].note.as_deref(), Some("Accelerator Revenue"));

        let highlight = accepted[1].clone().into_highlight("run-1");
        assert_eq!(highlight.origin, HighlightOrigin::AutoGenerated);
        assert_eq!(highlight.run_id.as_deref(), Some("run-1"));
        assert_eq!(highlight.score, Some(0.9));
        assert_eq!(highlight.rects.len(), 1);
    }

    #[test]
    fn test_fallback_only_when_nothing_accepted() {
        let all = vec![scored(0, 0, 50, 0.7), scored(1, 0, 50, 0.65)];
        let mut selector = Selector::new(0.6, 10);
        assert!(selector.select_batch(&all).is_empty());

        let fallback = selector.fallback(&all).unwrap();
        assert_eq!(fallback.scored.chunk.ordinal, 0);
        assert!(selector.fallback(&all).is_none());

        let mut selector = Selector::new(0.8, 10);
        assert!(selector.fallback(&all).is_none());
    }
}
