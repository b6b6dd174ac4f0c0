//! Standalone Phase 2 entry point, run against whatever `orbit_data`
//! already holds — typically scheduled after a `propagate` run.

use std::sync::Arc;

use conjunction_engine::config::Config;
use conjunction_engine::conjunction::run_phase2;
use conjunction_engine::db::schema::ensure_schema;
use conjunction_engine::db::ConnectionPool;
use conjunction_engine::telemetry::init_tracing;

const PHASE2_WORKERS: usize = 30;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing("conjunction_engine=info,sqlx=warn")?;

    let config = Config::from_env()?;
    let pool = Arc::new(
        ConnectionPool::initialize(
            &config.connection_string(),
            std::cmp::max(30, PHASE2_WORKERS as u32),
            config.pool_acquire_timeout,
        )
        .await?,
    );

    ensure_schema(pool.raw()).await?;

    let rows_written = run_phase2(pool.clone(), PHASE2_WORKERS).await?;
    tracing::info!(rows_written, "conjunctions: upserted top-3 rankings");

    Arc::try_unwrap(pool)
        .unwrap_or_else(|_| panic!("connection pool still has outstanding references at shutdown"))
        .shutdown()
        .await;

    Ok(())
}
