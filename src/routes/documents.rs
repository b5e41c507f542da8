//! Document API endpoints
//!
//! Registration of on-disk PDFs, reader profile updates and manual
//! highlight editing. Every mutation goes through the document store, so it
//! is serialized with any run appending highlights to the same document.

use std::path::Path as FsPath;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post, put},
    Json, Router,
};
use serde::Serialize;

use crate::annotations::{Document, Highlight};
use crate::documents::{
    valid_density, DocumentError, DocumentSummary, NewHighlight, NoteUpdate, ProfileUpdate,
    RegisterDocumentRequest,
};
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Response for document list
#[derive(Serialize)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentSummary>,
    pub total: usize,
}

/// Response for a bulk highlight clear
#[derive(Serialize)]
pub struct ClearResponse {
    pub document_id: String,
    pub removed: usize,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_documents).post(register_document))
        .route("/:id", get(get_document).delete(delete_document))
        .route("/:id/profile", put(update_profile))
        .route("/:id/highlights", post(add_highlight).delete(clear_highlights))
        .route("/:id/highlights/:highlight_id", patch(update_note))
}

/// List all documents
async fn list_documents(State(state): State<AppState>) -> Json<DocumentListResponse> {
    let documents = state.documents().list().await;
    Json(DocumentListResponse {
        total: documents.len(),
        documents,
    })
}

/// Register a PDF already present on disk
async fn register_document(
    State(state): State<AppState>,
    Json(request): Json<RegisterDocumentRequest>,
) -> Result<(StatusCode, Json<Document>)> {
    let pdf_path = request.pdf_path.trim();
    if pdf_path.is_empty() {
        return Err(AppError::BadRequest("pdf_path is required".to_string()));
    }
    if let Some(density) = request.density_target {
        if !valid_density(density) {
            return Err(DocumentError::InvalidDensity(density).into());
        }
    }

    let page_count = state.lines().page_count(pdf_path).await?;

    let filename = request
        .filename
        .filter(|f| !f.trim().is_empty())
        .or_else(|| {
            FsPath::new(pdf_path)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| pdf_path.to_string());

    let mut document = Document::new(filename, pdf_path);
    document.page_count = Some(page_count);
    document.global_profile = request.global_profile;
    document.document_goal = request.document_goal;
    if let Some(density) = request.density_target {
        document.density_target = density;
    }

    let document = state.documents().insert(document).await;
    Ok((StatusCode::CREATED, Json(document)))
}

async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Document>> {
    Ok(Json(state.documents().get(&id).await?))
}

/// Remove a document and its highlights
async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.documents().remove(&id).await?;
    state.lines().invalidate(&id);
    Ok(StatusCode::NO_CONTENT)
}

async fn update_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<Document>> {
    Ok(Json(state.documents().update_profile(&id, update).await?))
}

/// Add a manual highlight
async fn add_highlight(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(highlight): Json<NewHighlight>,
) -> Result<(StatusCode, Json<Highlight>)> {
    let highlight = state.documents().add_highlight(&id, highlight).await?;
    Ok((StatusCode::CREATED, Json(highlight)))
}

/// Remove every highlight on a document
async fn clear_highlights(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ClearResponse>> {
    let removed = state.documents().clear_highlights(&id).await?;
    Ok(Json(ClearResponse {
        document_id: id,
        removed,
    }))
}

/// Edit the note of a manual highlight
async fn update_note(
    State(state): State<AppState>,
    Path((id, highlight_id)): Path<(String, String)>,
    Json(update): Json<NoteUpdate>,
) -> Result<Json<Highlight>> {
    let highlight = state
        .documents()
        .update_note(&id, &highlight_id, update.note)
        .await?;
    Ok(Json(highlight))
}
