use axum::Extension;
use axum::Json;
use axum::body::Body;
use axum::extract::{Request, State};
use serde::Serialize;

use super::AppState;
use crate::db::events;
use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::ical;

/// Body of a successful import response.
#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub success: bool,
    pub imported: usize,
    pub failed: usize,
    pub total: usize,
    /// Lines, alarms and blocks the decoder dropped.
    pub skipped: usize,
}

/// Handle POST /api/calendar/import/ics. The body is the raw calendar file.
pub async fn handle_import(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    request: Request<Body>,
) -> AppResult<Json<ImportResponse>> {
    let limit = state.import_max_bytes;
    let body = axum::body::to_bytes(request.into_body(), limit)
        .await
        .map_err(|_| AppError::PayloadTooLarge(limit))?;

    let text = String::from_utf8(body.to_vec())
        .map_err(|_| AppError::BadRequest("Invalid UTF-8 in calendar file".to_string()))?;

    let decoded = ical::decode_with_diagnostics(&text);
    let outcome = events::import_records(&state.pool, &user.id, &decoded.records).await;

    tracing::info!(
        username = %user.username,
        imported = outcome.imported,
        failed = outcome.failed,
        total = outcome.total,
        skipped = decoded.skipped.len(),
        "Calendar import finished"
    );

    Ok(Json(ImportResponse {
        success: true,
        imported: outcome.imported,
        failed: outcome.failed,
        total: outcome.total,
        skipped: decoded.skipped.len(),
    }))
}
