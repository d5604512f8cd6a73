use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::Case;
use crate::tries::TryError;

/// Find a case the user is allowed to work on: their own, or one shared
/// with them through case_members. Anything else is reported as not found
/// rather than forbidden, so case ids cannot be probed.
pub async fn find_case(pool: &SqlitePool, case_id: i64, user_id: &str) -> Result<Case, TryError> {
    sqlx::query_as::<_, Case>(
        "SELECT c.* FROM cases c
         LEFT JOIN case_members m ON m.case_id = c.id AND m.user_id = ?
         WHERE c.id = ? AND (c.owner_id = ? OR m.user_id IS NOT NULL)",
    )
    .bind(user_id)
    .bind(case_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(TryError::CaseNotFound)
}

pub async fn list_cases(pool: &SqlitePool, user_id: &str) -> Result<Vec<Case>, TryError> {
    let cases = sqlx::query_as::<_, Case>(
        "SELECT DISTINCT c.* FROM cases c
         LEFT JOIN case_members m ON m.case_id = c.id
         WHERE c.owner_id = ? OR m.user_id = ?
         ORDER BY c.created_at DESC",
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(cases)
}

pub async fn create_case(
    pool: &SqlitePool,
    user_id: &str,
    case_name: &str,
) -> Result<Case, TryError> {
    let now = Utc::now().to_rfc3339();

    let result = sqlx::query(
        "INSERT INTO cases (case_name, owner_id, last_try, created_at, updated_at)
         VALUES (?, ?, 0, ?, ?)",
    )
    .bind(case_name)
    .bind(user_id)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    let case = sqlx::query_as::<_, Case>("SELECT * FROM cases WHERE id = ?")
        .bind(result.last_insert_rowid())
        .fetch_one(pool)
        .await?;

    Ok(case)
}

/// Share a case with another user.
pub async fn add_member(pool: &SqlitePool, case_id: i64, user_id: &str) -> Result<(), TryError> {
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT OR IGNORE INTO case_members (case_id, user_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(case_id)
    .bind(user_id)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(())
}
