//! Document surface types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::annotations::{Document, Rect};

/// Listing entry for a document
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    pub highlight_count: usize,
    pub auto_highlight_count: usize,
    pub has_profile: bool,
    pub density_target: f32,
    /// Run currently active on the document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_run: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentSummary {
    pub fn new(document: &Document, active_run: Option<String>) -> Self {
        Self {
            id: document.id.clone(),
            filename: document.filename.clone(),
            page_count: document.page_count,
            highlight_count: document.highlights.len(),
            auto_highlight_count: document
                .highlights
                .iter()
                .filter(|h| h.is_auto_generated())
                .count(),
            has_profile: document.has_profile(),
            density_target: document.density_target,
            active_run,
            updated_at: document.updated_at,
        }
    }
}

/// Register an on-disk PDF
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterDocumentRequest {
    pub pdf_path: String,
    /// Defaults to the file name of `pdf_path`
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub global_profile: Option<String>,
    #[serde(default)]
    pub document_goal: Option<String>,
    #[serde(default)]
    pub density_target: Option<f32>,
}

/// Partial profile update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub global_profile: Option<String>,
    #[serde(default)]
    pub document_goal: Option<String>,
    #[serde(default)]
    pub density_target: Option<f32>,
}

/// A manual highlight to add
#[derive(Debug, Clone, Deserialize)]
pub struct NewHighlight {
    pub page_index: u32,
    pub rects: Vec<Rect>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NoteUpdate {
    pub note: Option<String>,
}

/// Document errors
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Highlight not found: {0}")]
    HighlightNotFound(String),

    #[error("Invalid highlight: {0}")]
    InvalidHighlight(String),

    #[error("Only manual highlights can be edited: {0}")]
    NotEditable(String),

    #[error("Density target must be in (0, 1], got {0}")]
    InvalidDensity(f32),

    #[error("Document {0} has an active auto-highlight run")]
    RunActive(String),
}

impl DocumentError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::NotFound(_) | Self::HighlightNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidHighlight(_) | Self::InvalidDensity(_) => StatusCode::BAD_REQUEST,
            Self::NotEditable(_) | Self::RunActive(_) => StatusCode::CONFLICT,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            Self::NotFound(_) | Self::HighlightNotFound(_) => "not_found",
            Self::InvalidHighlight(_) => "invalid_highlight",
            Self::NotEditable(_) => "not_editable",
            Self::InvalidDensity(_) => "invalid_density",
            Self::RunActive(_) => "run_active",
        }
    }
}

/// Whether `density` is a usable density target
pub fn valid_density(density: f32) -> bool {
    density.is_finite() && density > 0.0 && density <= 1.0
}
