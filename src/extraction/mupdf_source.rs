//! MuPDF line extraction
//!
//! Walks the structured-text tree (blocks, then lines) of every page.
//! MuPDF reports structured-text bounds with a top-left origin, so line
//! boxes are used as-is.

use std::path::Path;

use mupdf::{Document, TextPageOptions};

use super::types::{ExtractionError, LineSource, TextLine};
use crate::annotations::Rect;

/// Line source backed by MuPDF
#[derive(Debug, Clone, Default)]
pub struct MupdfLineSource {
    /// Keep whitespace runs as extracted
    pub preserve_whitespace: bool,
}

impl MupdfLineSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn open(pdf_path: &str) -> Result<Document, ExtractionError> {
        if !Path::new(pdf_path).exists() {
            return Err(ExtractionError::NotFound(pdf_path.to_string()));
        }
        Document::open(pdf_path).map_err(|e| ExtractionError::Open(e.to_string()))
    }

    fn options(&self) -> TextPageOptions {
        let mut opts = TextPageOptions::empty();
        if self.preserve_whitespace {
            opts |= TextPageOptions::PRESERVE_WHITESPACE;
        }
        opts
    }
}

impl LineSource for MupdfLineSource {
    fn page_count(&self, pdf_path: &str) -> Result<u32, ExtractionError> {
        let doc = Self::open(pdf_path)?;
        let count = doc.page_count()?;
        Ok(count.max(0) as u32)
    }

    fn extract_lines(&self, pdf_path: &str) -> Result<Vec<TextLine>, ExtractionError> {
        let doc = Self::open(pdf_path)?;
        let page_count = doc.page_count()?;
        let mut lines = Vec::new();

        for page_index in 0..page_count {
            let page = doc.load_page(page_index)?;
            let text_page = page.to_text_page(self.options())?;

            for block in text_page.blocks() {
                for line in block.lines() {
                    let mut text: String = line.chars().filter_map(|ch| ch.char()).collect();
                    if text.trim().is_empty() {
                        continue;
                    }
                    text.push('\n');

                    let bounds = line.bounds();
                    lines.push(TextLine {
                        page_index: page_index as u32,
                        text,
                        rect: Rect::new(bounds.x0, bounds.y0, bounds.x1, bounds.y1).normalize(),
                    });
                }
            }
        }

        tracing::debug!(
            pdf_path = %pdf_path,
            pages = page_count,
            lines = lines.len(),
            "Extracted text lines"
        );

        Ok(lines)
    }
}
