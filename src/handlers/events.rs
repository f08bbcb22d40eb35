use axum::extract::{Path, State};
use axum::response::Response;
use serde::Serialize;
use uuid::Uuid;

use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Serialize)]
struct PrefetchPayload {
    event_id: Uuid,
    tickets: usize,
}

/// Downloads the event's tickets so scans can be pre-checked offline.
pub async fn prefetch_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let tickets = state.gate.prefetch(event_id).await?;
    Ok(success(
        PrefetchPayload { event_id, tickets },
        "Ticket snapshot stored",
    ))
}

pub async fn event_attendance(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let summary = state
        .gate
        .attendance(event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event '{event_id}' was not found")))?;
    Ok(success(summary, "Attendance summary"))
}
