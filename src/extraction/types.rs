//! Extraction types

use serde::{Deserialize, Serialize};

use crate::annotations::Rect;

/// One extracted text line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    /// Zero-based page index
    pub page_index: u32,
    /// Line text, including its trailing newline
    pub text: String,
    /// Line bounding box in page points (origin top-left)
    pub rect: Rect,
}

impl TextLine {
    pub fn new(page_index: u32, text: impl Into<String>, rect: Rect) -> Self {
        Self {
            page_index,
            text: text.into(),
            rect,
        }
    }

    /// Whether the line carries at least one word
    pub fn has_words(&self) -> bool {
        self.text.split_whitespace().next().is_some()
    }
}

/// Extraction error types
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("PDF not found: {0}")]
    NotFound(String),

    #[error("Failed to open PDF: {0}")]
    Open(String),

    #[error("Text extraction failed: {0}")]
    Text(String),

    #[error("Extraction timed out after {0} seconds")]
    Timeout(u64),

    #[error("Extraction task failed: {0}")]
    Join(String),
}

impl From<mupdf::Error> for ExtractionError {
    fn from(err: mupdf::Error) -> Self {
        ExtractionError::Text(err.to_string())
    }
}

/// Source of page-bounded text lines for a PDF
///
/// Implementations are synchronous and may be CPU heavy; callers run them
/// on the blocking pool.
pub trait LineSource: Send + Sync {
    /// Number of pages in the PDF
    fn page_count(&self, pdf_path: &str) -> Result<u32, ExtractionError>;

    /// Every word-bearing line of the PDF, in reading order per page
    fn extract_lines(&self, pdf_path: &str) -> Result<Vec<TextLine>, ExtractionError>;
}
