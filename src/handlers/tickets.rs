use axum::extract::{Path, State};
use axum::response::Response;

use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;
use crate::validation::CancelOutcome;

/// `GET /api/tickets/:code` accepts a bare code or a full QR payload.
pub async fn get_ticket(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Response, AppError> {
    let report = state.gate.lookup(&code).await?;
    Ok(success(report, "Ticket lookup completed"))
}

pub async fn cancel_ticket(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Response, AppError> {
    let outcome = state
        .gate
        .cancel(&code)
        .await?
        .ok_or_else(|| AppError::ValidationError(format!("'{code}' is not a ticket code")))?;

    match outcome {
        CancelOutcome::Cancelled(ticket) => Ok(success(ticket, "Ticket cancelled")),
        CancelOutcome::NotFound => Err(AppError::NotFound(format!(
            "Ticket '{code}' was not found"
        ))),
        CancelOutcome::NotActive(ticket) => Err(AppError::Conflict(format!(
            "Ticket '{}' is {} and cannot be cancelled",
            ticket.ticket_code, ticket.status
        ))),
    }
}
