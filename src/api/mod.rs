mod auth;
pub mod export;
pub mod import;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub import_max_bytes: usize,
}

/// Build the calendar import/export router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/calendar/import/ics", post(import::handle_import))
        .route("/api/calendar/export/ics", get(export::handle_export))
        .layer(middleware::from_fn_with_state(
            state.pool.clone(),
            auth::require_auth,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use base64::Engine;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::db;
    use crate::db::users;
    use crate::ical;

    const SAMPLE: &str = "BEGIN:VCALENDAR\r\n\
                          VERSION:2.0\r\n\
                          BEGIN:VEVENT\r\n\
                          UID:abc@x\r\n\
                          DTSTART:20240115T090000\r\n\
                          DTEND:20240115T100000\r\n\
                          SUMMARY:Team sync\r\n\
                          BEGIN:VALARM\r\n\
                          TRIGGER:-PT10M\r\n\
                          ACTION:DISPLAY\r\n\
                          END:VALARM\r\n\
                          END:VEVENT\r\n\
                          BEGIN:VTODO\r\n\
                          SUMMARY:Missing times\r\n\
                          END:VTODO\r\n\
                          BEGIN:VEVENT\r\n\
                          SUMMARY:Rest day\r\n\
                          DTSTART;VALUE=DATE:20240116\r\n\
                          DTEND;VALUE=DATE:20240116\r\n\
                          END:VEVENT\r\n\
                          END:VCALENDAR\r\n";

    async fn setup(import_max_bytes: usize) -> (SqlitePool, Router) {
        let pool = db::test_pool().await;
        users::create_user(&pool, "alice", Some("alice@example.com"), "secret123")
            .await
            .unwrap();
        let app = router(AppState {
            pool: pool.clone(),
            import_max_bytes,
        });
        (pool, app)
    }

    fn basic_header(credentials: &str) -> String {
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(credentials)
        )
    }

    async fn send(
        app: &Router,
        request: Request<Body>,
    ) -> (StatusCode, Vec<u8>, header::HeaderMap) {
        let resp = app.clone().oneshot(request).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec(), headers)
    }

    fn import_request(body: &str, credentials: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/api/calendar/import/ics")
            .header("Content-Type", "text/calendar")
            .header("Authorization", basic_header(credentials))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn export_request(query: &str) -> Request<Body> {
        Request::builder()
            .method(Method::GET)
            .uri(format!("/api/calendar/export/ics{query}"))
            .header("Authorization", basic_header("alice:secret123"))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_requires_auth() {
        let (_pool, app) = setup(1024 * 1024).await;

        let req = Request::builder()
            .method(Method::GET)
            .uri("/api/calendar/export/ics")
            .body(Body::empty())
            .unwrap();
        let (status, _, headers) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(headers.contains_key(header::WWW_AUTHENTICATE));

        let (status, _, _) = send(&app, import_request(SAMPLE, "alice:wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_import_reports_counts() {
        let (_pool, app) = setup(1024 * 1024).await;

        let (status, body, _) = send(&app, import_request(SAMPLE, "alice:secret123")).await;
        assert_eq!(status, StatusCode::OK);

        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["imported"], 2);
        assert_eq!(json["failed"], 0);
        assert_eq!(json["total"], 2);
        assert_eq!(json["skipped"], 1);
    }

    #[tokio::test]
    async fn test_import_rejects_oversized_body() {
        let (_pool, app) = setup(16).await;

        let (status, _, _) = send(&app, import_request(SAMPLE, "alice:secret123")).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_import_rejects_invalid_utf8() {
        let (_pool, app) = setup(1024).await;

        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/calendar/import/ics")
            .header("Authorization", basic_header("alice:secret123"))
            .body(Body::from(vec![0xff, 0xfe, 0x00]))
            .unwrap();
        let (status, _, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_import_then_export_round_trip() {
        let (_pool, app) = setup(1024 * 1024).await;

        send(&app, import_request(SAMPLE, "alice:secret123")).await;

        let (status, body, headers) = send(&app, export_request("")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            headers.get(header::CONTENT_TYPE).unwrap(),
            "text/calendar; charset=utf-8"
        );
        let disposition = headers
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(disposition.starts_with("attachment; filename=\"calendar-export-"));

        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("UID:abc@x\r\n"));
        assert!(text.contains("DTSTART:20240115T090000\r\n"));
        assert!(text.contains("DTSTART;VALUE=DATE:20240116\r\n"));
        assert!(text.contains("TRIGGER:-PT10M\r\n"));

        let records = ical::decode(&text);
        let titles: Vec<&str> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Team sync", "Rest day"]);
        assert!(records[1].all_day);
        // Rows without an import id fall back to their storage id
        assert!(
            records[1]
                .external_id
                .as_deref()
                .is_some_and(|uid| uid.starts_with("event-") && uid.ends_with("@shiftcal"))
        );
    }

    #[tokio::test]
    async fn test_export_range_filter() {
        let (_pool, app) = setup(1024 * 1024).await;
        send(&app, import_request(SAMPLE, "alice:secret123")).await;

        let (_, body, _) = send(&app, export_request("")).await;
        let all = ical::decode(&String::from_utf8(body).unwrap());
        let start = all[0].start_ts;
        let end = all[0].end_ts;

        let query = format!("?fromTS={start}&toTS={end}");
        let (status, body, _) = send(&app, export_request(&query)).await;
        assert_eq!(status, StatusCode::OK);
        let records = ical::decode(&String::from_utf8(body).unwrap());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Team sync");
    }

    #[tokio::test]
    async fn test_export_bad_event_types() {
        let (_pool, app) = setup(1024).await;

        let (status, _, _) = send(&app, export_request("?eventTypeIds=1,abc")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body, _) = send(&app, export_request("?eventTypeIds=99")).await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(body).unwrap();
        assert!(!text.contains("BEGIN:VEVENT"));
        assert!(text.ends_with("END:VCALENDAR\r\n"));
    }
}
