//! Auto-highlight run endpoints
//!
//! ```text
//! POST   /documents/:id/auto                         start a run (202)
//! GET    /documents/:id/auto                         runs for the document
//! GET    /documents/:id/auto/:run_id                 run snapshot
//! DELETE /documents/:id/auto/:run_id                 request cancellation
//! GET    /documents/:id/auto/:run_id/highlights      highlights so far
//! GET    /documents/:id/auto/:run_id/events?since=N  event log slice
//! GET    /documents/:id/auto/:run_id/stream          server-sent events
//! ```

use std::convert::Infallible;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::engine::{RunSnapshot, RunState, SequencedEvent};
use crate::error::{AppError, Result};
use crate::registry::{EventSlice, RunHighlights, StartRunRequest};
use crate::state::AppState;

/// Acknowledgement for a started run
#[derive(Serialize)]
pub struct StartRunResponse {
    pub run_id: String,
    pub state: RunState,
    pub emitted: usize,
}

#[derive(Serialize)]
pub struct RunListResponse {
    pub runs: Vec<RunSnapshot>,
    pub total: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub since: usize,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:id/auto", get(list_runs).post(start_run))
        .route("/:id/auto/:run_id", get(run_status).delete(cancel_run))
        .route("/:id/auto/:run_id/highlights", get(run_highlights))
        .route("/:id/auto/:run_id/events", get(run_events))
        .route("/:id/auto/:run_id/stream", get(stream_events))
}

/// Start a run; the body is optional
async fn start_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<StartRunResponse>)> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        StartRunRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid run request: {}", e)))?
    };

    let snapshot = state.registry().start(&id, request).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(StartRunResponse {
            run_id: snapshot.run_id,
            state: snapshot.state,
            emitted: snapshot.emitted_count,
        }),
    ))
}

async fn list_runs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RunListResponse>> {
    if !state.documents().contains(&id).await {
        return Err(AppError::NotFound(format!("Document not found: {}", id)));
    }
    let runs = state.registry().list(&id).await;
    Ok(Json(RunListResponse {
        total: runs.len(),
        runs,
    }))
}

async fn run_status(
    State(state): State<AppState>,
    Path((id, run_id)): Path<(String, String)>,
) -> Result<Json<RunSnapshot>> {
    Ok(Json(state.registry().status(&id, &run_id).await?))
}

/// Request cancellation; repeated calls return the current snapshot
async fn cancel_run(
    State(state): State<AppState>,
    Path((id, run_id)): Path<(String, String)>,
) -> Result<Json<RunSnapshot>> {
    Ok(Json(state.registry().cancel(&id, &run_id).await?))
}

async fn run_highlights(
    State(state): State<AppState>,
    Path((id, run_id)): Path<(String, String)>,
) -> Result<Json<RunHighlights>> {
    Ok(Json(state.registry().fetch_highlights(&id, &run_id).await?))
}

async fn run_events(
    State(state): State<AppState>,
    Path((id, run_id)): Path<(String, String)>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventSlice>> {
    Ok(Json(state.registry().events(&id, &run_id, query.since).await?))
}

/// Replay and follow a run's events as server-sent events
///
/// A reconnecting client's `Last-Event-ID` takes precedence over `since`.
async fn stream_events(
    State(state): State<AppState>,
    Path((id, run_id)): Path<(String, String)>,
    Query(query): Query<EventsQuery>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let since = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok())
        .map(|seq| seq + 1)
        .unwrap_or(query.since);

    let events = state.registry().subscribe(&id, &run_id, since).await?;
    let stream = events.map(|event| Ok(to_sse(&event)));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse(event: &SequencedEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_default();
    Event::default()
        .event(event.event.name())
        .id(event.seq.to_string())
        .data(data)
}
