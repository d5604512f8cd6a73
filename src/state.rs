use sqlx::SqlitePool;

use crate::analytics::Analytics;

pub struct AppState {
    pub db: SqlitePool,
    pub analytics: Analytics,
}
