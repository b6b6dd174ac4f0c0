//! Idempotent schema bootstrap, distinct from a versioned migration chain.
//!
//! Grounded in the teacher's `src/bin/db_migrate.rs`, but simplified: the
//! teacher runs a numbered chain of `.sql` migration files through
//! PgBouncer-safe `simple_query` calls; this engine owns only two tables
//! and creates them with plain `CREATE TABLE IF NOT EXISTS` so that running
//! it twice against an already-provisioned database is a no-op. `satellites`
//! and `satellite_data` are an external collaborator's tables and are never
//! created or altered here.

use sqlx::PgPool;
use tracing::info;

use crate::db::Gateway;
use crate::errors::SqlError;

const CREATE_ORBIT_DATA: &str = r#"
CREATE TABLE IF NOT EXISTS orbit_data (
    satellite_id   BIGINT NOT NULL,
    timestamp      TIMESTAMPTZ NOT NULL,
    x_km           DOUBLE PRECISION NOT NULL,
    y_km           DOUBLE PRECISION NOT NULL,
    z_km           DOUBLE PRECISION NOT NULL,
    vx_km_s        DOUBLE PRECISION NOT NULL,
    vy_km_s        DOUBLE PRECISION NOT NULL,
    vz_km_s        DOUBLE PRECISION NOT NULL,
    PRIMARY KEY (satellite_id, timestamp)
)
"#;

const CREATE_TOP_COLLISION_PROBABILITIES: &str = r#"
CREATE TABLE IF NOT EXISTS top_collision_probabilities (
    satellite_id       BIGINT NOT NULL,
    rank               SMALLINT NOT NULL,
    other_satellite_id BIGINT NOT NULL,
    probability        DOUBLE PRECISION NOT NULL,
    calculation_time   TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (satellite_id, rank)
)
"#;

/// Creates `orbit_data` and `top_collision_probabilities` if they don't
/// already exist. Runs once, before any worker pool starts, on a connection
/// taken directly from the raw pool handle (see `ConnectionPool::raw`),
/// through `Gateway::execute_admin` — the one caller of it in this crate.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), SqlError> {
    let conn = pool.acquire().await?;
    let mut gateway = Gateway::new(conn);

    gateway.execute_admin(CREATE_ORBIT_DATA).await?;
    info!("ensured orbit_data table exists");

    gateway.execute_admin(CREATE_TOP_COLLISION_PROBABILITIES).await?;
    info!("ensured top_collision_probabilities table exists");

    Ok(())
}
