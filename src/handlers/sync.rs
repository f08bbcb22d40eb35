use axum::extract::{Path, State};
use axum::response::Response;
use serde::Serialize;

use crate::offline::QueueStats;
use crate::state::AppState;
use crate::sync::Mode;
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Serialize)]
struct SyncStatusPayload {
    mode: Mode,
    queue: QueueStats,
}

pub async fn sync_status(State(state): State<AppState>) -> Result<Response, AppError> {
    let payload = SyncStatusPayload {
        mode: state.gate.connectivity().mode(),
        queue: state.gate.queue().stats().await?,
    };
    Ok(success(payload, "Sync status"))
}

/// Runs a sync pass now instead of waiting for the next tick.
pub async fn run_sync(State(state): State<AppState>) -> Result<Response, AppError> {
    let report = state.reconciler.sync_once().await?;
    let message = if report.interrupted {
        "Sync interrupted: ticket store unreachable"
    } else {
        "Sync completed"
    };
    Ok(success(report, message))
}

/// A single queue entry, including abandoned ones and their last error.
pub async fn sync_entry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let entry = state
        .gate
        .queue()
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Offline validation {id} was not found")))?;
    Ok(success(entry, "Offline validation retrieved"))
}
