//! Try lifecycle: creation with per-engine defaults and sequence numbers,
//! rename-only updates, cascading deletes, and the curator variable store.
//! Stored `args` are recompiled here on every query-affecting mutation, never
//! lazily.

use std::collections::BTreeMap;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use sqlx::SqlitePool;

use crate::compile::{self, SearchEngine, DEFAULT_NUMBER_OF_ROWS};
use crate::models::{Case, CreateTryRequest, CuratorVariable, Try, TryView};

static VAR_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

#[derive(Debug, thiserror::Error)]
pub enum TryError {
    #[error("case not found")]
    CaseNotFound,
    #[error("try not found")]
    TryNotFound,
    #[error("curator variable not found")]
    VariableNotFound,
    #[error("unknown search engine: {0}")]
    UnknownEngine(String),
    #[error("invalid curator variable name: {0}")]
    InvalidVariableName(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Atomically claim the next try number for a case. A single UPDATE with
/// RETURNING, so concurrent creations on the same case are serialized by the
/// database and never see the same number. Numbers are not reused after
/// deletion.
pub async fn next_try_number(pool: &SqlitePool, case_id: i64) -> Result<i64, TryError> {
    let now = Utc::now().to_rfc3339();

    let row: Option<(i64,)> = sqlx::query_as(
        "UPDATE cases SET last_try = last_try + 1, updated_at = ? WHERE id = ? RETURNING last_try",
    )
    .bind(&now)
    .bind(case_id)
    .fetch_optional(pool)
    .await?;

    row.map(|(n,)| n).ok_or(TryError::CaseNotFound)
}

pub async fn list_tries(pool: &SqlitePool, case_id: i64) -> Result<Vec<Try>, TryError> {
    let tries = sqlx::query_as::<_, Try>(
        "SELECT * FROM tries WHERE case_id = ? ORDER BY try_number DESC",
    )
    .bind(case_id)
    .fetch_all(pool)
    .await?;

    Ok(tries)
}

pub async fn get_try(pool: &SqlitePool, case_id: i64, try_number: i64) -> Result<Try, TryError> {
    sqlx::query_as::<_, Try>("SELECT * FROM tries WHERE case_id = ? AND try_number = ?")
        .bind(case_id)
        .bind(try_number)
        .fetch_optional(pool)
        .await?
        .ok_or(TryError::TryNotFound)
}

/// Create a try on the case, filling omitted fields from the engine defaults
/// and compiling `args`. The curator variables supplied with the request are
/// created before the compile so they take part in it.
pub async fn create_try(
    pool: &SqlitePool,
    case: &Case,
    req: &CreateTryRequest,
) -> Result<Try, TryError> {
    let engine = match req.search_engine.as_deref() {
        Some(tag) => SearchEngine::parse(tag).ok_or_else(|| TryError::UnknownEngine(tag.to_string()))?,
        None => SearchEngine::default(),
    };
    let defaults = engine.defaults();

    let query_params = req
        .query_params
        .clone()
        .unwrap_or_else(|| defaults.query_params.to_string());
    let search_url = req
        .search_url
        .clone()
        .unwrap_or_else(|| defaults.search_url.to_string());
    let field_spec = req
        .field_spec
        .clone()
        .unwrap_or_else(|| defaults.field_spec.to_string());
    let escape_query = req.escape_query.unwrap_or(true);
    let number_of_rows = req.number_of_rows.unwrap_or(DEFAULT_NUMBER_OF_ROWS);

    // Validate variables before claiming a sequence number, so a bad request
    // does not burn one.
    let mut variables = BTreeMap::new();
    if let Some(curator_vars) = &req.curator_vars {
        for (var_name, value) in curator_vars {
            if !VAR_NAME_RE.is_match(var_name) {
                return Err(TryError::InvalidVariableName(var_name.clone()));
            }
            variables.insert(var_name.clone(), value_as_string(value));
        }
    }

    let try_number = next_try_number(pool, case.id).await?;
    let name = req
        .name
        .clone()
        .unwrap_or_else(|| format!("Try {}", try_number));

    let args = compile::compile_args(engine, &query_params, escape_query, &variables, None);
    let args_text = args.map(|v| v.to_string());

    // The try row and its variables must land together: args were compiled
    // against the full variable set, so a partial write would leave stored
    // args inconsistent with stored variables.
    let mut tx = pool.begin().await?;

    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        "INSERT INTO tries (case_id, try_number, name, search_engine, search_url, field_spec,
                            query_params, escape_query, number_of_rows, args, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(case.id)
    .bind(try_number)
    .bind(&name)
    .bind(engine.as_str())
    .bind(&search_url)
    .bind(&field_spec)
    .bind(&query_params)
    .bind(escape_query)
    .bind(number_of_rows)
    .bind(&args_text)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    let try_id = result.last_insert_rowid();

    for (var_name, value) in &variables {
        sqlx::query(
            "INSERT INTO curator_variables (try_id, name, value, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(try_id)
        .bind(var_name)
        .bind(value)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    }

    let created = sqlx::query_as::<_, Try>("SELECT * FROM tries WHERE id = ?")
        .bind(try_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(
        "Created try {} on case {} (engine {})",
        created.try_number,
        case.id,
        created.search_engine
    );

    Ok(created)
}

/// Rename a try. Every other field in the update payload is accepted and
/// ignored, so the query shape and compiled `args` of an existing try never
/// change after creation.
pub async fn rename_try(
    pool: &SqlitePool,
    case_id: i64,
    try_number: i64,
    name: Option<&str>,
) -> Result<Try, TryError> {
    let try_row = get_try(pool, case_id, try_number).await?;

    if let Some(name) = name {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE tries SET name = ?, updated_at = ? WHERE id = ?")
            .bind(name)
            .bind(&now)
            .bind(try_row.id)
            .execute(pool)
            .await?;
    }

    get_try(pool, case_id, try_number).await
}

/// Delete a try together with its curator variables. The case's `last_try`
/// stays where it is; numbers are never handed out twice.
pub async fn delete_try(pool: &SqlitePool, case_id: i64, try_number: i64) -> Result<(), TryError> {
    let try_row = get_try(pool, case_id, try_number).await?;

    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM curator_variables WHERE try_id = ?")
        .bind(try_row.id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM tries WHERE id = ?")
        .bind(try_row.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!("Deleted try {} on case {}", try_number, case_id);

    Ok(())
}

/// Create or update one curator variable, then recompile the try's `args`.
pub async fn set_curator_var(
    pool: &SqlitePool,
    try_row: &Try,
    name: &str,
    value: &str,
) -> Result<Try, TryError> {
    if !VAR_NAME_RE.is_match(name) {
        return Err(TryError::InvalidVariableName(name.to_string()));
    }

    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO curator_variables (try_id, name, value, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT (try_id, name) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    )
    .bind(try_row.id)
    .bind(name)
    .bind(value)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    recompile_args(pool, try_row).await
}

/// Remove one curator variable, then recompile the try's `args`.
pub async fn remove_curator_var(
    pool: &SqlitePool,
    try_row: &Try,
    name: &str,
) -> Result<Try, TryError> {
    let result = sqlx::query("DELETE FROM curator_variables WHERE try_id = ? AND name = ?")
        .bind(try_row.id)
        .bind(name)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(TryError::VariableNotFound);
    }

    recompile_args(pool, try_row).await
}

/// Recompute stored `args` from the try's current template, escape flag and
/// curator variables, and persist the result.
async fn recompile_args(pool: &SqlitePool, try_row: &Try) -> Result<Try, TryError> {
    let engine = SearchEngine::parse(&try_row.search_engine).unwrap_or_default();
    let variables = curator_vars_btree(pool, try_row.id).await?;

    let args = compile::compile_args(
        engine,
        &try_row.query_params,
        try_row.escape_query,
        &variables,
        None,
    );
    let args_text = args.map(|v| v.to_string());

    let now = Utc::now().to_rfc3339();
    sqlx::query("UPDATE tries SET args = ?, updated_at = ? WHERE id = ?")
        .bind(&args_text)
        .bind(&now)
        .bind(try_row.id)
        .execute(pool)
        .await?;

    get_try(pool, try_row.case_id, try_row.try_number).await
}

/// Curator variables of a try as a name→value map, sorted by name.
pub async fn curator_vars_map(
    pool: &SqlitePool,
    try_id: i64,
) -> Result<Map<String, Value>, TryError> {
    let rows = sqlx::query_as::<_, CuratorVariable>(
        "SELECT * FROM curator_variables WHERE try_id = ? ORDER BY name",
    )
    .bind(try_id)
    .fetch_all(pool)
    .await?;

    let mut map = Map::new();
    for row in rows {
        map.insert(row.name, Value::String(row.value));
    }

    Ok(map)
}

async fn curator_vars_btree(
    pool: &SqlitePool,
    try_id: i64,
) -> Result<BTreeMap<String, String>, TryError> {
    let rows = sqlx::query_as::<_, CuratorVariable>(
        "SELECT * FROM curator_variables WHERE try_id = ? ORDER BY name",
    )
    .bind(try_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|row| (row.name, row.value)).collect())
}

/// Assemble the wire view of a try (fields + args + curator variables).
pub async fn try_view(pool: &SqlitePool, try_row: &Try) -> Result<TryView, TryError> {
    let curator_vars = curator_vars_map(pool, try_row.id).await?;
    Ok(TryView::from_try(try_row, curator_vars))
}

fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    // In-memory SQLite: a single connection, or every checkout would see a
    // different empty database.
    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        pool
    }

    async fn test_case(pool: &SqlitePool) -> Case {
        let user_id: String = sqlx::query_scalar("SELECT id FROM users WHERE username = 'admin'")
            .fetch_one(pool)
            .await
            .unwrap();
        cases::create_case(pool, &user_id, "test case").await.unwrap()
    }

    #[tokio::test]
    async fn create_assigns_defaults_and_number() {
        let pool = test_pool().await;
        let case = test_case(&pool).await;

        let created = create_try(&pool, &case, &CreateTryRequest::default())
            .await
            .unwrap();

        assert_eq!(created.try_number, 1);
        assert_eq!(created.search_engine, "solr");
        assert_eq!(created.query_params, "q=#$query##");
        assert_eq!(
            created.search_url,
            SearchEngine::Solr.defaults().search_url
        );
        assert_eq!(created.field_spec, SearchEngine::Solr.defaults().field_spec);
        assert!(created.escape_query);
        assert_eq!(created.number_of_rows, 10);
        assert!(created.name.contains("Try"));
        assert!(created.name.contains('1'));

        let args: Value = serde_json::from_str(created.args.as_deref().unwrap()).unwrap();
        assert_eq!(args, json!({"q": ["#$query##"]}));
    }

    #[tokio::test]
    async fn create_applies_es_defaults() {
        let pool = test_pool().await;
        let case = test_case(&pool).await;

        let created = create_try(
            &pool,
            &case,
            &CreateTryRequest {
                search_engine: Some("es".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(created.search_engine, "es");
        assert_eq!(created.query_params, SearchEngine::Es.defaults().query_params);
        assert_eq!(created.search_url, SearchEngine::Es.defaults().search_url);
        assert!(created.args.is_some());
    }

    #[tokio::test]
    async fn create_rejects_unknown_engine() {
        let pool = test_pool().await;
        let case = test_case(&pool).await;

        let err = create_try(
            &pool,
            &case,
            &CreateTryRequest {
                search_engine: Some("sphinx".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TryError::UnknownEngine(_)));
    }

    #[tokio::test]
    async fn malformed_es_template_persists_without_args() {
        let pool = test_pool().await;
        let case = test_case(&pool).await;

        let created = create_try(
            &pool,
            &case,
            &CreateTryRequest {
                search_engine: Some("es".to_string()),
                query_params: Some(r##"{ "query": "#$query##""##.to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(created.args.is_none());
        assert!(get_try(&pool, case.id, created.try_number).await.is_ok());
    }

    #[tokio::test]
    async fn sequencer_is_monotonic_and_never_reuses() {
        let pool = test_pool().await;
        let case = test_case(&pool).await;

        let mut numbers = Vec::new();
        for _ in 0..5 {
            let created = create_try(&pool, &case, &CreateTryRequest::default())
                .await
                .unwrap();
            numbers.push(created.try_number);
        }

        let mut distinct = numbers.clone();
        distinct.sort();
        distinct.dedup();
        assert_eq!(distinct.len(), numbers.len());

        let last_try: i64 = sqlx::query_scalar("SELECT last_try FROM cases WHERE id = ?")
            .bind(case.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(last_try, 5);
        assert!(numbers.iter().all(|n| *n <= last_try));

        // Deleting the latest try must not free its number.
        delete_try(&pool, case.id, 5).await.unwrap();
        let created = create_try(&pool, &case, &CreateTryRequest::default())
            .await
            .unwrap();
        assert_eq!(created.try_number, 6);
    }

    #[tokio::test]
    async fn rename_changes_only_the_name() {
        let pool = test_pool().await;
        let case = test_case(&pool).await;

        let created = create_try(&pool, &case, &CreateTryRequest::default())
            .await
            .unwrap();
        let args_before = created.args.clone();

        let renamed = rename_try(&pool, case.id, created.try_number, Some("New Name"))
            .await
            .unwrap();

        assert_eq!(renamed.name, "New Name");
        assert_eq!(renamed.query_params, created.query_params);
        assert_eq!(renamed.args, args_before);
        assert_eq!(renamed.try_number, created.try_number);
    }

    #[tokio::test]
    async fn delete_cascades_curator_variables() {
        let pool = test_pool().await;
        let case = test_case(&pool).await;

        let mut curator_vars = Map::new();
        curator_vars.insert("var1".to_string(), json!("1"));
        curator_vars.insert("var2".to_string(), json!("2"));

        let created = create_try(
            &pool,
            &case,
            &CreateTryRequest {
                curator_vars: Some(curator_vars),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM curator_variables")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 2);

        delete_try(&pool, case.id, created.try_number).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM curator_variables")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn delete_missing_try_is_not_found() {
        let pool = test_pool().await;
        let case = test_case(&pool).await;
        create_try(&pool, &case, &CreateTryRequest::default())
            .await
            .unwrap();

        let err = delete_try(&pool, case.id, 123_456).await.unwrap_err();
        assert!(matches!(err, TryError::TryNotFound));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tries WHERE case_id = ?")
            .bind(case.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn curator_variable_changes_recompile_args() {
        let pool = test_pool().await;
        let case = test_case(&pool).await;

        let created = create_try(
            &pool,
            &case,
            &CreateTryRequest {
                query_params: Some("q=#$query##&bq=year:{year}".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        // Unresolved placeholder passes through literally.
        let args: Value = serde_json::from_str(created.args.as_deref().unwrap()).unwrap();
        assert_eq!(args, json!({"q": ["#$query##"], "bq": ["year:{year}"]}));

        let updated = set_curator_var(&pool, &created, "year", "2014").await.unwrap();
        let args: Value = serde_json::from_str(updated.args.as_deref().unwrap()).unwrap();
        assert_eq!(args, json!({"q": ["#$query##"], "bq": ["year:2014"]}));

        let updated = remove_curator_var(&pool, &created, "year").await.unwrap();
        let args: Value = serde_json::from_str(updated.args.as_deref().unwrap()).unwrap();
        assert_eq!(args, json!({"q": ["#$query##"], "bq": ["year:{year}"]}));
    }

    #[tokio::test]
    async fn invalid_curator_variable_name_is_rejected() {
        let pool = test_pool().await;
        let case = test_case(&pool).await;

        let created = create_try(&pool, &case, &CreateTryRequest::default())
            .await
            .unwrap();

        let err = set_curator_var(&pool, &created, "not a name", "1")
            .await
            .unwrap_err();
        assert!(matches!(err, TryError::InvalidVariableName(_)));
    }

    #[tokio::test]
    async fn rejected_create_does_not_burn_a_try_number() {
        let pool = test_pool().await;
        let case = test_case(&pool).await;

        let mut curator_vars = Map::new();
        curator_vars.insert("not a name".to_string(), json!("1"));

        let err = create_try(
            &pool,
            &case,
            &CreateTryRequest {
                curator_vars: Some(curator_vars),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TryError::InvalidVariableName(_)));

        let last_try: i64 = sqlx::query_scalar("SELECT last_try FROM cases WHERE id = ?")
            .bind(case.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(last_try, 0);

        let created = create_try(&pool, &case, &CreateTryRequest::default())
            .await
            .unwrap();
        assert_eq!(created.try_number, 1);
    }

    #[tokio::test]
    async fn failed_variable_insert_rolls_back_the_try() {
        let pool = test_pool().await;
        let case = test_case(&pool).await;

        // Make one variable insert fail mid-create to check that the try row
        // does not survive a partial write.
        sqlx::query(
            "CREATE TRIGGER reject_var BEFORE INSERT ON curator_variables
             WHEN NEW.name = 'zz_rejected'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let mut curator_vars = Map::new();
        curator_vars.insert("accepted".to_string(), json!("1"));
        curator_vars.insert("zz_rejected".to_string(), json!("2"));

        let err = create_try(
            &pool,
            &case,
            &CreateTryRequest {
                curator_vars: Some(curator_vars),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TryError::Database(_)));

        let try_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tries WHERE case_id = ?")
            .bind(case.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(try_count, 0);

        let var_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM curator_variables")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(var_count, 0);
    }

    #[tokio::test]
    async fn shared_case_is_visible_to_member() {
        let pool = test_pool().await;
        let case = test_case(&pool).await;

        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO users (id, username, password_hash, enabled, created_at, updated_at)
             VALUES ('u2', 'teammate', 'x', 1, ?, ?)",
        )
        .bind(&now)
        .bind(&now)
        .execute(&pool)
        .await
        .unwrap();

        assert!(matches!(
            cases::find_case(&pool, case.id, "u2").await.unwrap_err(),
            TryError::CaseNotFound
        ));

        cases::add_member(&pool, case.id, "u2").await.unwrap();
        let shared = cases::find_case(&pool, case.id, "u2").await.unwrap();
        assert_eq!(shared.id, case.id);
    }
}
