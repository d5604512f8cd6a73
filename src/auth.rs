//! Cookie session handling. Handlers call `current_user` before touching any
//! case; everything else about who may see which case lives in `cases`.

use axum::http::StatusCode;
use axum::Json;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::models::User;

pub const SESSION_COOKIE_NAME: &str = "querylab_session";

const SESSION_TTL_HOURS: i64 = 24 * 7;

pub async fn create_session(pool: &SqlitePool, user_id: &str) -> Result<String, sqlx::Error> {
    let session_id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let expires_at = now + Duration::hours(SESSION_TTL_HOURS);

    sqlx::query("INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)")
        .bind(&session_id)
        .bind(user_id)
        .bind(expires_at.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(pool)
        .await?;

    Ok(session_id)
}

pub async fn destroy_session(pool: &SqlitePool, session_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(session_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Resolve the session cookie to an enabled user, or fail the request with
/// 401.
pub async fn current_user(
    pool: &SqlitePool,
    cookies: &Cookies,
) -> Result<User, (StatusCode, Json<Value>)> {
    let session_id = cookies
        .get(SESSION_COOKIE_NAME)
        .map(|c| c.value().to_string())
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "Not logged in"})),
            )
        })?;

    let user: Option<User> = sqlx::query_as(
        "SELECT u.* FROM users u
         JOIN sessions s ON u.id = s.user_id
         WHERE s.id = ? AND s.expires_at > ? AND u.enabled = 1",
    )
    .bind(&session_id)
    .bind(Utc::now().to_rfc3339())
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        tracing::error!("Session lookup failed: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Server error"})),
        )
    })?;

    user.ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Session expired"})),
        )
    })
}
