use axum::extract::State;
use axum::response::Response;
use serde::Serialize;

use crate::state::AppState;
use crate::sync::Mode;
use crate::utils::error::AppError;
use crate::utils::response::success;

pub mod events;
pub mod sync;
pub mod tickets;
pub mod validations;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
    mode: Mode,
    pending_validations: u64,
}

pub async fn health_check(State(state): State<AppState>) -> Result<Response, AppError> {
    let stats = state.gate.queue().stats().await?;
    let payload = HealthPayload {
        status: "ok",
        service: "ticketgate",
        mode: state.gate.connectivity().mode(),
        pending_validations: stats.pending,
    };

    Ok(success(payload, "Health check successful"))
}
