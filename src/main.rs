use axum::{
    routing::{get, post},
    Router,
};
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;
use tower_cookies::CookieManagerLayer;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use querylab_backend::analytics::Analytics;
use querylab_backend::state::AppState;
use querylab_backend::{api, config, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "querylab_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app_config = config::load_config().expect("Failed to load configuration");
    tracing::info!(
        "Server will listen on {}:{}",
        app_config.server.host,
        app_config.server.port
    );

    let data_dir = app_config.get_data_dir();
    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)?;
        tracing::info!("Created data directory: {:?}", data_dir);
    }

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| app_config.get_database_url());

    let pool = SqlitePool::connect(&database_url).await?;

    db::run_migrations(&pool).await?;

    let state = Arc::new(AppState {
        db: pool,
        analytics: Analytics::new(app_config.analytics.webhook_url.clone()),
    });

    let app = Router::new()
        .route("/api/health", get(api::server::health_check))
        .route("/api/version", get(api::server::get_version_info))
        .route("/api/auth/login", post(api::auth::login))
        .route("/api/auth/logout", post(api::auth::logout))
        .route("/api/auth/me", get(api::auth::me))
        .route("/api/cases", get(api::cases::list_cases))
        .route("/api/cases", post(api::cases::create_case))
        .route("/api/cases/:case_id/tries", get(api::tries::list_tries))
        .route("/api/cases/:case_id/tries", post(api::tries::create_try))
        .route(
            "/api/cases/:case_id/tries/:try_number",
            get(api::tries::get_try),
        )
        .route(
            "/api/cases/:case_id/tries/:try_number",
            post(api::tries::update_try),
        )
        .route(
            "/api/cases/:case_id/tries/:try_number/delete",
            post(api::tries::delete_try),
        )
        .route(
            "/api/cases/:case_id/tries/:try_number/curator_vars",
            post(api::tries::set_curator_var),
        )
        .route(
            "/api/cases/:case_id/tries/:try_number/curator_vars/:name/delete",
            post(api::tries::remove_curator_var),
        )
        .layer(CookieManagerLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let bind_addr = app_config.get_bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server running at http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
