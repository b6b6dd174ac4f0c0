//! Schema bootstrap entry point: creates `orbit_data` and
//! `top_collision_probabilities` if they don't already exist. Safe to run
//! any number of times against an already-provisioned database.

use anyhow::Context;
use conjunction_engine::config::Config;
use conjunction_engine::db::schema::ensure_schema;
use conjunction_engine::telemetry::init_tracing;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing("conjunction_engine=info,sqlx=warn")?;

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&config.connection_string())
        .await
        .context("failed to connect to database for schema bootstrap")?;

    ensure_schema(&pool)
        .await
        .context("schema bootstrap failed")?;

    info!("schema bootstrap complete");
    pool.close().await;
    Ok(())
}
