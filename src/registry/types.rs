//! Run registry types

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::annotations::Highlight;
use crate::documents::DocumentError;
use crate::engine::{RunState, SequencedEvent};

/// Highest page number accepted in a page list
pub const MAX_PAGE_NUMBER: u32 = 100_000;

/// Start request for an auto-highlight run
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartRunRequest {
    /// Defaults to the document's density target
    #[serde(default)]
    pub density_target: Option<f32>,
    /// Defaults to the configured threshold
    #[serde(default)]
    pub min_threshold: Option<f32>,
    /// 1-based pages such as `"3-5,9"`; absent means every page
    #[serde(default)]
    pub pages: Option<String>,
}

/// Highlights a run has placed on its document, as they stand now
#[derive(Debug, Clone, Serialize)]
pub struct RunHighlights {
    pub run_id: String,
    pub document_id: String,
    pub state: RunState,
    pub partial: bool,
    pub emitted_count: usize,
    pub highlights: Vec<Highlight>,
}

/// A slice of a run's event log
#[derive(Debug, Clone, Serialize)]
pub struct EventSlice {
    pub run_id: String,
    pub state: RunState,
    pub events: Vec<SequencedEvent>,
    /// Cursor to pass as `since` on the next call
    pub next_since: usize,
    /// No further events will be logged
    pub complete: bool,
}

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Document {document_id} already has an active run ({run_id})")]
    AlreadyRunning { document_id: String, run_id: String },

    #[error("Run not found: {0}")]
    NotFound(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Density target must be in (0, 1], got {0}")]
    InvalidDensity(f32),

    #[error("Relevance threshold must be in [0, 1], got {0}")]
    InvalidThreshold(f32),

    #[error("Invalid page range: {0}")]
    InvalidPageRange(String),

    #[error("Document {0} needs both a reader profile and a document goal")]
    ProfileIncomplete(String),

    #[error(transparent)]
    Document(DocumentError),
}

impl From<DocumentError> for RegistryError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::NotFound(id) => RegistryError::DocumentNotFound(id),
            other => RegistryError::Document(other),
        }
    }
}

impl RegistryError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::AlreadyRunning { .. } => StatusCode::CONFLICT,
            Self::NotFound(_) | Self::DocumentNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidDensity(_)
            | Self::InvalidThreshold(_)
            | Self::InvalidPageRange(_)
            | Self::ProfileIncomplete(_) => StatusCode::BAD_REQUEST,
            Self::Document(e) => e.status_code(),
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            Self::AlreadyRunning { .. } => "already_running",
            Self::NotFound(_) | Self::DocumentNotFound(_) => "not_found",
            Self::InvalidDensity(_) => "invalid_density",
            Self::InvalidThreshold(_) => "invalid_threshold",
            Self::InvalidPageRange(_) => "invalid_page_range",
            Self::ProfileIncomplete(_) => "profile_incomplete",
            Self::Document(e) => e.error_type(),
        }
    }
}

fn page_number(raw: &str, spec: &str) -> Result<u32, RegistryError> {
    let page: u32 = raw
        .trim()
        .parse()
        .map_err(|_| RegistryError::InvalidPageRange(spec.to_string()))?;
    if page == 0 || page > MAX_PAGE_NUMBER {
        return Err(RegistryError::InvalidPageRange(spec.to_string()));
    }
    Ok(page)
}

/// Parse 1-based pages and ranges into zero-based page indices
///
/// Reversed ranges are accepted (`"5-3"` is `"3-5"`); blank parts are
/// skipped.
pub fn parse_pages(spec: &str) -> Result<BTreeSet<u32>, RegistryError> {
    let mut pages = BTreeSet::new();

    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let start = page_number(start, spec)?;
                let end = page_number(end, spec)?;
                let (low, high) = if start <= end { (start, end) } else { (end, start) };
                pages.extend((low..=high).map(|p| p - 1));
            }
            None => {
                pages.insert(page_number(part, spec)? - 1);
            }
        }
    }

    if pages.is_empty() {
        return Err(RegistryError::InvalidPageRange(spec.to_string()));
    }
    Ok(pages)
}
