use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_cookies::Cookies;

use crate::auth;
use crate::cases;
use crate::models::CreateCaseRequest;
use crate::state::AppState;

use super::error_response;

pub async fn list_cases(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let user = auth::current_user(&state.db, &cookies).await?;

    let cases = cases::list_cases(&state.db, &user.id)
        .await
        .map_err(error_response)?;

    Ok(Json(json!({"cases": cases})))
}

pub async fn create_case(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Json(req): Json<CreateCaseRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let user = auth::current_user(&state.db, &cookies).await?;

    let case = cases::create_case(&state.db, &user.id, &req.case_name)
        .await
        .map_err(error_response)?;

    Ok(Json(json!({"case": case})))
}
