use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_cookies::{Cookie, Cookies};

use crate::auth::{self, SESSION_COOKIE_NAME};
use crate::models::{LoginRequest, User};
use crate::state::AppState;

pub async fn login(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Json(req): Json<LoginRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let user: Option<User> =
        sqlx::query_as("SELECT * FROM users WHERE username = ? AND enabled = 1")
            .bind(&req.username)
            .fetch_optional(&state.db)
            .await
            .map_err(|e| {
                tracing::error!("User lookup failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "Server error"})),
                )
            })?;

    let Some(user) = user else {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Invalid username or password"})),
        ));
    };

    let valid = bcrypt::verify(&req.password, &user.password_hash).unwrap_or(false);
    if !valid {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Invalid username or password"})),
        ));
    }

    let session_id = auth::create_session(&state.db, &user.id).await.map_err(|e| {
        tracing::error!("Failed to create session: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Server error"})),
        )
    })?;

    let mut cookie = Cookie::new(SESSION_COOKIE_NAME, session_id);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookies.add(cookie);

    tracing::info!("User {} logged in", user.username);

    Ok(Json(json!({"user": user})))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if let Some(cookie) = cookies.get(SESSION_COOKIE_NAME) {
        let _ = auth::destroy_session(&state.db, cookie.value()).await;
        let mut removal = Cookie::new(SESSION_COOKIE_NAME, "");
        removal.set_path("/");
        cookies.remove(removal);
    }

    Ok(Json(json!({"message": "Logged out"})))
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let user = auth::current_user(&state.db, &cookies).await?;
    Ok(Json(json!({"user": user})))
}
