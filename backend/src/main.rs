// --- File: backend/src/main.rs ---

use backend::config::AppConfig;
use backend::db::{self, DbPoolOptions};
use backend::web_server::{run_server, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- Setup ---
    // 1. Initialize structured logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::INFO) // This sets the minimum level to INFO
        .init();

    let app_config = AppConfig::from_env()?;

    let db_pool = DbPoolOptions::new()
        .max_connections(5)
        .connect(&app_config.database.url)
        .await?;

    tracing::info!("Running database migrations...");
    db::migrate(&db_pool).await?;
    tracing::info!("Migrations complete.");

    // --- Run Server ---
    tracing::info!("Initializing server...");
    run_server(AppState::new(db_pool, app_config)).await?;
    Ok(())
}
