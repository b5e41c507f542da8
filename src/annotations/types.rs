//! Highlight and document types
//!
//! Coordinates are page-relative PDF points (72 dpi), origin top-left,
//! matching what the MuPDF structured-text walk produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default soft density target (fraction of document words)
pub const DEFAULT_DENSITY_TARGET: f32 = 0.10;

/// Colour used for highlights created by a person
pub const MANUAL_COLOR: &str = "yellow";

/// Colour used for highlights created by an auto-highlight run
pub const AUTO_COLOR: &str = "orange";

/// Rectangle in PDF points, `(x1, y1)` to `(x2, y2)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Rect {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Reorder corners so that `x1 <= x2` and `y1 <= y2`
    pub fn normalize(self) -> Self {
        Self {
            x1: self.x1.min(self.x2),
            y1: self.y1.min(self.y2),
            x2: self.x1.max(self.x2),
            y2: self.y1.max(self.y2),
        }
    }

    pub fn top(&self) -> f32 {
        self.y1.min(self.y2)
    }

    pub fn bottom(&self) -> f32 {
        self.y1.max(self.y2)
    }

    pub fn is_finite(&self) -> bool {
        self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
    }
}

impl From<(f32, f32, f32, f32)> for Rect {
    fn from((x1, y1, x2, y2): (f32, f32, f32, f32)) -> Self {
        Self::new(x1, y1, x2, y2)
    }
}

/// Who created a highlight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightOrigin {
    /// Created directly by the reader
    Manual,
    /// Accepted by an auto-highlight run
    AutoGenerated,
}

impl HighlightOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::AutoGenerated => "auto_generated",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "auto_generated" => Self::AutoGenerated,
            _ => Self::Manual,
        }
    }
}

/// A persisted annotation on one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub id: String,
    pub page_index: u32,
    /// One rectangle per covered line, reading order
    pub rects: Vec<Rect>,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub origin: HighlightOrigin,
    /// Relevance score in [0, 1] for auto-generated highlights
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    /// Run that produced this highlight
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Highlight {
    /// Create a reader-made highlight
    pub fn manual(page_index: u32, rects: Vec<Rect>, note: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            page_index,
            rects: rects.into_iter().map(Rect::normalize).collect(),
            color: MANUAL_COLOR.to_string(),
            note,
            origin: HighlightOrigin::Manual,
            score: None,
            extracted_text: None,
            run_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a highlight accepted by an auto-highlight run
    pub fn auto_generated(
        run_id: &str,
        page_index: u32,
        rects: Vec<Rect>,
        score: f32,
        note: Option<String>,
        text: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            page_index,
            rects,
            color: AUTO_COLOR.to_string(),
            note,
            origin: HighlightOrigin::AutoGenerated,
            score: Some(score),
            extracted_text: Some(text.to_string()),
            run_id: Some(run_id.to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_auto_generated(&self) -> bool {
        self.origin == HighlightOrigin::AutoGenerated
    }
}

/// A PDF together with its reader profile and highlights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub pdf_path: String,
    /// Known page count, used to bound highlight page indices
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    pub highlights: Vec<Highlight>,
    /// General reader background
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_profile: Option<String>,
    /// What the reader wants from this PDF
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_goal: Option<String>,
    /// Fraction of words auto-highlighting should aim to cover, in (0, 1]
    pub density_target: f32,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(filename: impl Into<String>, pdf_path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            filename: filename.into(),
            pdf_path: pdf_path.into(),
            page_count: None,
            highlights: Vec::new(),
            global_profile: None,
            document_goal: None,
            density_target: DEFAULT_DENSITY_TARGET,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether both profile and goal carry text
    pub fn has_profile(&self) -> bool {
        let filled = |s: &Option<String>| s.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false);
        filled(&self.global_profile) && filled(&self.document_goal)
    }

    pub fn add_highlight(&mut self, highlight: Highlight) {
        self.highlights.push(highlight);
        self.touch();
    }

    /// Remove every highlight, returning how many were dropped
    pub fn clear_highlights(&mut self) -> usize {
        let count = self.highlights.len();
        self.highlights.clear();
        self.touch();
        count
    }

    pub fn highlights_for_run(&self, run_id: &str) -> impl Iterator<Item = &Highlight> {
        self.highlights
            .iter()
            .filter(move |h| h.run_id.as_deref() == Some(run_id))
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
