use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_cookies::Cookies;

use crate::auth;
use crate::cases;
use crate::models::{CreateTryRequest, SetCuratorVarRequest, UpdateTryRequest};
use crate::state::AppState;
use crate::tries;

use super::error_response;

pub async fn list_tries(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Path(case_id): Path<i64>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let user = auth::current_user(&state.db, &cookies).await?;
    let case = cases::find_case(&state.db, case_id, &user.id)
        .await
        .map_err(error_response)?;

    let try_rows = tries::list_tries(&state.db, case.id)
        .await
        .map_err(error_response)?;

    let mut views = Vec::with_capacity(try_rows.len());
    for try_row in &try_rows {
        views.push(
            tries::try_view(&state.db, try_row)
                .await
                .map_err(error_response)?,
        );
    }

    Ok(Json(json!({"tries": views})))
}

pub async fn get_try(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Path((case_id, try_number)): Path<(i64, i64)>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let user = auth::current_user(&state.db, &cookies).await?;
    let case = cases::find_case(&state.db, case_id, &user.id)
        .await
        .map_err(error_response)?;

    let try_row = tries::get_try(&state.db, case.id, try_number)
        .await
        .map_err(error_response)?;
    let view = tries::try_view(&state.db, &try_row)
        .await
        .map_err(error_response)?;

    Ok(Json(serde_json::to_value(view).unwrap_or(Value::Null)))
}

pub async fn create_try(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Path(case_id): Path<i64>,
    Json(req): Json<CreateTryRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let user = auth::current_user(&state.db, &cookies).await?;
    let case = cases::find_case(&state.db, case_id, &user.id)
        .await
        .map_err(error_response)?;

    let created = tries::create_try(&state.db, &case, &req)
        .await
        .map_err(error_response)?;

    state
        .analytics
        .try_created(case.id, created.try_number, &created.search_engine);

    let view = tries::try_view(&state.db, &created)
        .await
        .map_err(error_response)?;

    Ok(Json(serde_json::to_value(view).unwrap_or(Value::Null)))
}

/// Rename endpoint. Only `name` is honored; any other submitted field is
/// ignored so the try's query shape stays immutable after creation.
pub async fn update_try(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Path((case_id, try_number)): Path<(i64, i64)>,
    Json(req): Json<UpdateTryRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let user = auth::current_user(&state.db, &cookies).await?;
    let case = cases::find_case(&state.db, case_id, &user.id)
        .await
        .map_err(error_response)?;

    let renamed = tries::rename_try(&state.db, case.id, try_number, req.name.as_deref())
        .await
        .map_err(error_response)?;
    let view = tries::try_view(&state.db, &renamed)
        .await
        .map_err(error_response)?;

    Ok(Json(serde_json::to_value(view).unwrap_or(Value::Null)))
}

pub async fn delete_try(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Path((case_id, try_number)): Path<(i64, i64)>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    let user = auth::current_user(&state.db, &cookies).await?;
    let case = cases::find_case(&state.db, case_id, &user.id)
        .await
        .map_err(error_response)?;

    tries::delete_try(&state.db, case.id, try_number)
        .await
        .map_err(error_response)?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_curator_var(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Path((case_id, try_number)): Path<(i64, i64)>,
    Json(req): Json<SetCuratorVarRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let user = auth::current_user(&state.db, &cookies).await?;
    let case = cases::find_case(&state.db, case_id, &user.id)
        .await
        .map_err(error_response)?;

    let try_row = tries::get_try(&state.db, case.id, try_number)
        .await
        .map_err(error_response)?;
    let updated = tries::set_curator_var(&state.db, &try_row, &req.name, &req.value)
        .await
        .map_err(error_response)?;
    let view = tries::try_view(&state.db, &updated)
        .await
        .map_err(error_response)?;

    Ok(Json(serde_json::to_value(view).unwrap_or(Value::Null)))
}

pub async fn remove_curator_var(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Path((case_id, try_number, name)): Path<(i64, i64, String)>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let user = auth::current_user(&state.db, &cookies).await?;
    let case = cases::find_case(&state.db, case_id, &user.id)
        .await
        .map_err(error_response)?;

    let try_row = tries::get_try(&state.db, case.id, try_number)
        .await
        .map_err(error_response)?;
    let updated = tries::remove_curator_var(&state.db, &try_row, &name)
        .await
        .map_err(error_response)?;
    let view = tries::try_view(&state.db, &updated)
        .await
        .map_err(error_response)?;

    Ok(Json(serde_json::to_value(view).unwrap_or(Value::Null)))
}
