use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use base64::Engine;
use sqlx::SqlitePool;

use crate::db::models::User;
use crate::db::users;
use crate::error::{AppError, AppResult};

/// Resolve the calling user from HTTP Basic credentials and store it in the
/// request extensions. Rejects with 401 otherwise.
pub async fn require_auth(
    State(pool): State<SqlitePool>,
    mut request: Request,
    next: Next,
) -> AppResult<Response> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let (username, password) = parse_basic_auth(auth_header).ok_or(AppError::Unauthorized)?;

    let user = users::authenticate(&pool, &username, &password)
        .await?
        .ok_or_else(|| {
            tracing::info!(%username, "Rejected credentials");
            AppError::Unauthorized
        })?;

    request.extensions_mut().insert::<User>(user);

    Ok(next.run(request).await)
}

/// Decode a `Basic` Authorization header into (username, password).
fn parse_basic_auth(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    let (username, password) = credentials.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}
