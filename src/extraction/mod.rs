//! Text line extraction
//!
//! Produces page-bounded text lines with bounding rectangles, the raw
//! input of the chunker.

mod cache;
mod mupdf_source;
mod types;

pub use cache::{LineCache, DEFAULT_CACHE_CAPACITY, DEFAULT_EXTRACT_TIMEOUT_SECS};
pub use mupdf_source::MupdfLineSource;
pub use types::{ExtractionError, LineSource, TextLine};
