use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub enabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Case {
    pub id: i64,
    pub case_name: String,
    pub owner_id: String,
    pub last_try: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Try {
    pub id: i64,
    pub case_id: i64,
    pub try_number: i64,
    pub name: String,
    pub search_engine: String,
    pub search_url: String,
    pub field_spec: String,
    pub query_params: String,
    pub escape_query: bool,
    pub number_of_rows: i64,
    /// Compiled args as JSON text; NULL when the template does not parse.
    pub args: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CuratorVariable {
    pub id: i64,
    pub try_id: i64,
    pub name: String,
    pub value: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCaseRequest {
    pub case_name: String,
}

/// Fields accepted when creating a try. Anything omitted is filled from the
/// engine defaults. Wire names are camelCase; a snake_case alias is kept
/// where older clients still send it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateTryRequest {
    pub name: Option<String>,
    pub search_engine: Option<String>,
    pub search_url: Option<String>,
    pub field_spec: Option<String>,
    pub query_params: Option<String>,
    pub escape_query: Option<bool>,
    #[serde(alias = "number_of_rows")]
    pub number_of_rows: Option<i64>,
    pub curator_vars: Option<Map<String, Value>>,
}

/// Update payload. Only `name` is honored; the other fields are accepted so
/// clients that post the whole try back do not break, but they never change
/// stored state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateTryRequest {
    pub name: Option<String>,
    pub search_url: Option<String>,
    pub field_spec: Option<String>,
    pub query_params: Option<String>,
    pub escape_query: Option<bool>,
    #[serde(alias = "number_of_rows")]
    pub number_of_rows: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetCuratorVarRequest {
    pub name: String,
    pub value: String,
}

/// Wire representation of a try.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TryView {
    pub try_no: i64,
    pub name: String,
    pub search_engine: String,
    pub search_url: String,
    pub field_spec: String,
    pub query_params: String,
    pub escape_query: bool,
    pub number_of_rows: i64,
    pub args: Option<Value>,
    /// Empty object when the try has no curator variables.
    pub curator_vars: Map<String, Value>,
}

impl TryView {
    pub fn from_try(try_row: &Try, curator_vars: Map<String, Value>) -> Self {
        let args = try_row
            .args
            .as_deref()
            .and_then(|text| serde_json::from_str(text).ok());

        Self {
            try_no: try_row.try_number,
            name: try_row.name.clone(),
            search_engine: try_row.search_engine.clone(),
            search_url: try_row.search_url.clone(),
            field_spec: try_row.field_spec.clone(),
            query_params: try_row.query_params.clone(),
            escape_query: try_row.escape_query,
            number_of_rows: try_row.number_of_rows,
            args,
            curator_vars,
        }
    }
}
