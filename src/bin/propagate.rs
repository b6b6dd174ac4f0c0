//! Standalone Phase 1 entry point, for operators who schedule propagation
//! and conjunction analysis as separate jobs.

use std::sync::Arc;

use conjunction_engine::config::Config;
use conjunction_engine::db::schema::ensure_schema;
use conjunction_engine::db::ConnectionPool;
use conjunction_engine::propagation::{run_phase1, PropagationParams};
use conjunction_engine::telemetry::init_tracing;

const PHASE1_WORKERS: usize = 12;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing("conjunction_engine=info,sqlx=warn")?;

    let config = Config::from_env()?;
    let pool = Arc::new(
        ConnectionPool::initialize(
            &config.connection_string(),
            std::cmp::max(30, PHASE1_WORKERS as u32),
            config.pool_acquire_timeout,
        )
        .await?,
    );

    ensure_schema(pool.raw()).await?;

    run_phase1(
        pool.clone(),
        PropagationParams {
            num_satellites: config.num_satellites,
            offset: config.offset,
            step_size_min: config.step_size_min,
        },
        PHASE1_WORKERS,
    )
    .await?;

    Arc::try_unwrap(pool)
        .unwrap_or_else(|_| panic!("connection pool still has outstanding references at shutdown"))
        .shutdown()
        .await;

    Ok(())
}
