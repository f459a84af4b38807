use payflow::{app, auth, payments, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "payflow=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = AppState::init().await?;

    if let Err(e) = sqlx::migrate!("./migrations").run(&app_state.db).await {
        tracing::warn!(error = %e, "migrations folder not found or migration failed; continuing");
    }

    // Convenience bootstrap: a seeded admin account and a few sample payments
    // so a fresh instance has something on the dashboard.
    let admin =
        auth::service::ensure_default_account(&app_state.db, &app_state.config.admin).await?;
    payments::service::seed_sample_data(&app_state, admin.id).await?;

    let app = app::build_app(app_state);
    app::serve(app).await
}
