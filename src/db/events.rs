use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::models::{EventRow, NewEvent, REGULAR_EVENT_TYPE_ID, SOURCE_IMPORTED_ICS};
use crate::error::AppResult;
use crate::ical::CalendarRecord;

/// Result of storing a batch of decoded records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    pub imported: usize,
    pub failed: usize,
    pub total: usize,
}

/// Filters for selecting events to export.
#[derive(Debug, Clone, Default)]
pub struct ExportFilter {
    pub from_ts: Option<i64>,
    pub to_ts: Option<i64>,
    pub event_types: Vec<i64>,
}

/// Insert one record for a user. Returns the new row's ID.
pub async fn insert_event(
    pool: &SqlitePool,
    user_id: &str,
    record: &CalendarRecord,
    source: &str,
) -> AppResult<String> {
    let id = Uuid::now_v7().to_string();
    let new = NewEvent::from_record(record);
    let last_updated = record
        .last_modified
        .unwrap_or_else(|| chrono::Utc::now().timestamp());

    sqlx::query(
        "INSERT INTO events
         (id, user_id, kind, start_ts, end_ts, title, location, description,
          reminder_1_minutes, reminder_2_minutes, reminder_3_minutes,
          reminder_1_type, reminder_2_type, reminder_3_type,
          repeat_interval, repeat_rule, repeat_limit, import_id, flags,
          event_type, source, last_updated, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                 COALESCE(?, datetime('now')))",
    )
    .bind(&id)
    .bind(user_id)
    .bind(new.kind)
    .bind(new.start_ts)
    .bind(new.end_ts)
    .bind(&new.title)
    .bind(&new.location)
    .bind(&new.description)
    .bind(new.reminder_minutes[0])
    .bind(new.reminder_minutes[1])
    .bind(new.reminder_minutes[2])
    .bind(new.reminder_types[0])
    .bind(new.reminder_types[1])
    .bind(new.reminder_types[2])
    .bind(new.repeat_interval)
    .bind(new.repeat_rule)
    .bind(new.repeat_limit)
    .bind(&new.import_id)
    .bind(new.flags)
    .bind(REGULAR_EVENT_TYPE_ID)
    .bind(source)
    .bind(last_updated)
    .bind(new.created_at)
    .execute(pool)
    .await?;

    Ok(id)
}

/// Store decoded records one by one. A failed insert is counted and logged
/// but does not stop the rest of the batch.
pub async fn import_records(
    pool: &SqlitePool,
    user_id: &str,
    records: &[CalendarRecord],
) -> ImportOutcome {
    let mut outcome = ImportOutcome {
        total: records.len(),
        ..Default::default()
    };

    for record in records {
        match insert_event(pool, user_id, record, SOURCE_IMPORTED_ICS).await {
            Ok(_) => outcome.imported += 1,
            Err(e) => {
                tracing::warn!(
                    %user_id,
                    uid = ?record.external_id,
                    "Failed to store imported event: {e}"
                );
                outcome.failed += 1;
            }
        }
    }

    outcome
}

/// Get an event row by ID.
#[cfg(test)]
pub async fn get_event(pool: &SqlitePool, id: &str) -> AppResult<Option<EventRow>> {
    let row = sqlx::query_as::<_, EventRow>("SELECT * FROM events WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// List a user's events for export, ordered by start time.
///
/// The time range only applies when both bounds are given; an event matches
/// when it overlaps `[from_ts, to_ts]`.
pub async fn list_for_export(
    pool: &SqlitePool,
    user_id: &str,
    filter: &ExportFilter,
) -> AppResult<Vec<EventRow>> {
    let mut query = String::from("SELECT * FROM events WHERE user_id = ?");

    let range = filter.from_ts.zip(filter.to_ts);
    if range.is_some() {
        query.push_str(" AND start_ts <= ? AND end_ts >= ?");
    }

    if !filter.event_types.is_empty() {
        let placeholders: Vec<&str> = filter.event_types.iter().map(|_| "?").collect();
        query.push_str(&format!(" AND event_type IN ({})", placeholders.join(", ")));
    }

    query.push_str(" ORDER BY start_ts");

    let mut q = sqlx::query_as::<_, EventRow>(&query).bind(user_id);
    if let Some((from_ts, to_ts)) = range {
        q = q.bind(to_ts).bind(from_ts);
    }
    for event_type in &filter.event_types {
        q = q.bind(event_type);
    }

    let rows = q.fetch_all(pool).await?;
    Ok(rows)
}
