pub mod auth;
pub mod cases;
pub mod server;
pub mod tries;

use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::tries::TryError;

/// Map a domain error onto the wire. Structural errors (not found) keep
/// their identity; database errors are logged and collapsed to a 500.
pub fn error_response(err: TryError) -> (StatusCode, Json<Value>) {
    match &err {
        TryError::CaseNotFound | TryError::TryNotFound | TryError::VariableNotFound => {
            (StatusCode::NOT_FOUND, Json(json!({"error": err.to_string()})))
        }
        TryError::UnknownEngine(_) | TryError::InvalidVariableName(_) => {
            (StatusCode::BAD_REQUEST, Json(json!({"error": err.to_string()})))
        }
        TryError::Database(e) => {
            tracing::error!("Database error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Server error"})),
            )
        }
    }
}
