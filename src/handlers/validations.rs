use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;

use crate::gate::ScanRequest;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success_with_status;
use crate::validation::ValidationOutcome;

/// `POST /api/validations`: one door scan.
///
/// Rejections (already used, cancelled, ...) are normal answers, not errors:
/// the scanner reads `data.admit` and `data.result`. Scans queued while
/// offline answer `202 Accepted`.
pub async fn create_validation(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> Result<Response, AppError> {
    let report = state.gate.scan(request).await?;

    let status = match report.outcome {
        ValidationOutcome::Queued { .. } => StatusCode::ACCEPTED,
        _ => StatusCode::OK,
    };
    let message = format!("Ticket {}", report.outcome.label().replace('_', " "));
    Ok(success_with_status(status, report, message))
}
