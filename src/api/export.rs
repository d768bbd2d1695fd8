use axum::Extension;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use super::AppState;
use crate::db::events::{self, ExportFilter};
use crate::db::models::{EventRow, User};
use crate::error::{AppError, AppResult};
use crate::ical;

/// Query parameters of the export endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ExportParams {
    #[serde(rename = "fromTS")]
    pub from_ts: Option<i64>,
    #[serde(rename = "toTS")]
    pub to_ts: Option<i64>,
    /// Comma-separated event type IDs.
    #[serde(rename = "eventTypeIds")]
    pub event_type_ids: Option<String>,
}

impl ExportParams {
    pub fn into_filter(self) -> AppResult<ExportFilter> {
        let event_types = match self.event_type_ids.as_deref() {
            Some(ids) => parse_event_types(ids)?,
            None => Vec::new(),
        };
        Ok(ExportFilter {
            from_ts: self.from_ts,
            to_ts: self.to_ts,
            event_types,
        })
    }
}

/// Parse `1,2,3`. Empty segments are ignored.
pub fn parse_event_types(ids: &str) -> AppResult<Vec<i64>> {
    ids.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| AppError::BadRequest(format!("Invalid event type id '{s}'")))
        })
        .collect()
}

/// Download filename for an export made today.
pub fn export_filename() -> String {
    format!(
        "calendar-export-{}.ics",
        chrono::Local::now().format("%Y-%m-%d")
    )
}

/// Handle GET /api/calendar/export/ics.
pub async fn handle_export(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(params): Query<ExportParams>,
) -> AppResult<Response> {
    let filter = params.into_filter()?;
    let rows = events::list_for_export(&state.pool, &user.id, &filter).await?;

    let records: Vec<_> = rows.into_iter().map(EventRow::into_record).collect();
    let body = ical::encode(&records);

    tracing::info!(
        username = %user.username,
        count = records.len(),
        "Calendar export generated"
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", export_filename()),
            ),
        ],
        body,
    )
        .into_response())
}
