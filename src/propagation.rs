//! Phase 1: propagate every satellite's TLE over a bounded window and
//! upsert the resulting ephemeris into `orbit_data`, per spec.md §4.6.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::{info, warn};

use crate::db::gateway::get_string;
use crate::db::{ConnectionPool, Gateway};
use crate::epoch::{parse_tle_epoch, shift_timestamp};
use crate::errors::{IncompleteRecord, ParseError, PropagationError};
use crate::models::{EphemerisRow, PropagatedRow, SatelliteId, TleRecord};
use crate::sgp4_adapter;
use crate::worker_pool::WorkerPool;
use thiserror::Error;

/// One day, in minutes — the upper bound on a satellite's propagation
/// window per spec.md §4.6 step (d).
const MAX_WINDOW_MIN: f64 = 1440.0;

pub struct PropagationParams {
    pub num_satellites: i64,
    pub offset: i64,
    pub step_size_min: f64,
}

/// Everything that can stop a single satellite's pipeline short, per
/// spec.md §4.6 / §7. Never crosses a satellite boundary — `propagate_one`
/// logs it and moves on.
#[derive(Debug, Error)]
enum StageError {
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Propagation(#[from] PropagationError),
}

/// Runs Phase 1 to completion: loads the catalog page, submits one task
/// per satellite to a bounded worker pool, and awaits every task before
/// returning. Per-satellite failures are isolated — this function itself
/// never returns an error for them.
pub async fn run_phase1(
    pool: Arc<ConnectionPool>,
    params: PropagationParams,
    worker_count: usize,
) -> Result<(), sqlx::Error> {
    let catalog = load_catalog_page(&pool, params.num_satellites, params.offset).await?;
    if catalog.is_empty() {
        warn!("phase 1: satellite catalog page is empty, nothing to propagate");
        return Ok(());
    }

    info!(count = catalog.len(), "phase 1: propagating satellites");

    let workers = WorkerPool::new(worker_count);
    for satellite_id in catalog {
        let pool = pool.clone();
        let step_size_min = params.step_size_min;
        workers.add_task(async move {
            propagate_one(pool, satellite_id, step_size_min).await;
        });
    }
    workers.shutdown().await;

    Ok(())
}

async fn load_catalog_page(
    pool: &ConnectionPool,
    limit: i64,
    offset: i64,
) -> Result<Vec<SatelliteId>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT satellite_id FROM satellites ORDER BY satellite_id LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool.raw())
    .await?;

    Ok(rows
        .iter()
        .map(|row| SatelliteId(row.get::<i64, _>("satellite_id")))
        .collect())
}

/// One satellite's full propagate-and-upsert pipeline. Every failure path
/// logs with `satellite_id` and returns without touching other satellites,
/// per spec.md §4.6's isolation requirement.
async fn propagate_one(pool: Arc<ConnectionPool>, satellite_id: SatelliteId, step_size_min: f64) {
    let conn = match pool.acquire().await {
        Some(conn) => conn,
        None => {
            warn!(%satellite_id, "phase 1: connection acquire timed out, skipping satellite");
            return;
        }
    };
    let mut gateway = Gateway::new(conn);

    let tle = match load_tle(&mut gateway, satellite_id).await {
        Ok(Some(tle)) => tle,
        Ok(None) => {
            warn!(%satellite_id, "phase 1: missing or empty TLE, skipping satellite");
            return;
        }
        Err(e) => {
            warn!(%satellite_id, error = %e, "phase 1: failed to load TLE, skipping satellite");
            return;
        }
    };

    let ephemeris = match build_ephemeris_rows(&tle, step_size_min, Utc::now()) {
        Ok(rows) => rows,
        Err(e) => {
            warn!(%satellite_id, error = %e, "phase 1: skipping satellite");
            return;
        }
    };

    if ephemeris.is_empty() {
        warn!(%satellite_id, "phase 1: no ephemeris rows produced, skipping satellite");
        return;
    }

    if let Err(e) = upsert_ephemeris(&mut gateway, &ephemeris).await {
        warn!(%satellite_id, error = %e, "phase 1: upsert failed, rolled back");
    }
}

/// The pure heart of Phase 1: given a TLE and a step size, parses the
/// epoch, bounds-checks the propagation window, invokes the SGP4 adapter,
/// and drops any row with a non-finite field (spec.md §4.6 step (f),
/// §7's `IncompleteRecord`). Takes no connection and touches no global
/// state, so a malformed or degenerate TLE here can never affect another
/// satellite's run (P2) and identical inputs always produce identical
/// output (P1 — the upsert's `ON CONFLICT DO UPDATE` only needs this to
/// be a function of its arguments to be idempotent).
fn build_ephemeris_rows(
    tle: &TleRecord,
    step_size_min: f64,
    now: DateTime<Utc>,
) -> Result<Vec<EphemerisRow>, StageError> {
    let epoch_utc = parse_tle_epoch(&tle.tle_line1)?;

    let stop_time_min = (now + chrono::Duration::hours(3) - epoch_utc).num_seconds() as f64 / 60.0;
    if !window_in_bounds(stop_time_min) {
        return Err(StageError::Propagation(PropagationError::WindowOutOfBounds(
            stop_time_min,
        )));
    }

    let propagated = sgp4_adapter::propagate(
        &tle.tle_line1,
        &tle.tle_line2,
        0.0,
        stop_time_min,
        step_size_min,
    )?;

    let mut rows = Vec::with_capacity(propagated.len());
    for row in propagated {
        if !row_is_complete(&row) {
            warn!(
                satellite_id = %tle.satellite_id,
                error = %IncompleteRecord::MissingField(row.tsince_min),
                "phase 1: dropping row with non-finite field"
            );
            continue;
        }

        rows.push(EphemerisRow {
            satellite_id: tle.satellite_id,
            timestamp_utc: shift_timestamp(epoch_utc, row.tsince_min),
            x_km: row.x_km,
            y_km: row.y_km,
            z_km: row.z_km,
            vx_km_s: row.vx_km_s,
            vy_km_s: row.vy_km_s,
            vz_km_s: row.vz_km_s,
        });
    }

    Ok(rows)
}

/// `stop_time_min` must land in `(0, 1440]` per spec.md §4.6 step (d) / P7.
fn window_in_bounds(stop_time_min: f64) -> bool {
    stop_time_min > 0.0 && stop_time_min <= MAX_WINDOW_MIN
}

/// A propagated row is usable only if every field is finite — a degenerate
/// orbit (deep-space decay, near-singular elements) can make the `sgp4`
/// crate return `NaN`/`inf` components instead of an `Err`.
fn row_is_complete(row: &PropagatedRow) -> bool {
    row.x_km.is_finite()
        && row.y_km.is_finite()
        && row.z_km.is_finite()
        && row.vx_km_s.is_finite()
        && row.vy_km_s.is_finite()
        && row.vz_km_s.is_finite()
}

async fn load_tle(
    gateway: &mut Gateway,
    satellite_id: SatelliteId,
) -> Result<Option<TleRecord>, crate::errors::SqlError> {
    let query = sqlx::query("SELECT tle_line1, tle_line2 FROM satellite_data WHERE satellite_id = $1")
        .bind(satellite_id.0);
    let rows = gateway.execute_select(query).await?;

    let Some(row) = rows.first() else {
        return Ok(None);
    };

    let tle_line1 = get_string(row, "tle_line1")?;
    let tle_line2 = get_string(row, "tle_line2")?;
    if tle_line1.trim().is_empty() || tle_line2.trim().is_empty() {
        return Ok(None);
    }

    Ok(Some(TleRecord {
        satellite_id,
        tle_line1,
        tle_line2,
    }))
}

/// Single multi-row insert with `ON CONFLICT (satellite_id, timestamp) DO
/// UPDATE`, wrapped in one explicit transaction, per spec.md §4.6 step (g).
async fn upsert_ephemeris(
    gateway: &mut Gateway,
    rows: &[EphemerisRow],
) -> Result<(), crate::errors::SqlError> {
    gateway.begin_transaction().await?;

    let mut builder = sqlx::QueryBuilder::new(
        "INSERT INTO orbit_data (satellite_id, timestamp, x_km, y_km, z_km, vx_km_s, vy_km_s, vz_km_s) ",
    );
    builder.push_values(rows, |mut b, row| {
        b.push_bind(row.satellite_id.0)
            .push_bind(row.timestamp_utc)
            .push_bind(row.x_km)
            .push_bind(row.y_km)
            .push_bind(row.z_km)
            .push_bind(row.vx_km_s)
            .push_bind(row.vy_km_s)
            .push_bind(row.vz_km_s);
    });
    builder.push(
        " ON CONFLICT (satellite_id, timestamp) DO UPDATE SET \
          x_km = EXCLUDED.x_km, y_km = EXCLUDED.y_km, z_km = EXCLUDED.z_km, \
          vx_km_s = EXCLUDED.vx_km_s, vy_km_s = EXCLUDED.vy_km_s, vz_km_s = EXCLUDED.vz_km_s",
    );

    let query = builder.build();
    match gateway.execute_update(query).await {
        Ok(_) => gateway.commit().await,
        Err(e) => {
            let _ = gateway.rollback().await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // Canonical Vallado/Celestrak SGP4 validation case for ISS (checksums
    // verified), used here rather than a hand-built line so the sgp4 crate's
    // own TLE/checksum validation accepts it.
    const VALID_LINE1: &str =
        "1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927";
    const VALID_LINE2: &str =
        "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537";

    fn tle(satellite_id: i64, line1: &str, line2: &str) -> TleRecord {
        TleRecord {
            satellite_id: SatelliteId(satellite_id),
            tle_line1: line1.to_string(),
            tle_line2: line2.to_string(),
        }
    }

    #[test]
    fn window_bound_matches_one_day_in_minutes() {
        assert_eq!(MAX_WINDOW_MIN, 24.0 * 60.0);
        assert!(!window_in_bounds(0.0));
        assert!(!window_in_bounds(-5.0));
        assert!(window_in_bounds(1440.0));
        assert!(!window_in_bounds(1440.0001));
        assert!(window_in_bounds(0.5));
    }

    // P7: a TLE whose epoch is far enough in the past that `now + 3h` lands
    // more than 1440 minutes later is rejected, not silently clamped.
    #[test]
    fn build_ephemeris_rows_rejects_out_of_bounds_window() {
        let record = tle(1, VALID_LINE1, VALID_LINE2);
        let far_future = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let err = build_ephemeris_rows(&record, 1.0, far_future).unwrap_err();
        assert!(matches!(err, StageError::Propagation(PropagationError::WindowOutOfBounds(_))));
    }

    // P2: a malformed TLE produces a contained `Err` rather than touching
    // any shared state, which is what lets `propagate_one` isolate one
    // satellite's failure from the rest of the catalog.
    #[test]
    fn build_ephemeris_rows_isolates_a_malformed_tle() {
        let record = tle(2, "too short", VALID_LINE2);
        let now = parse_tle_epoch(VALID_LINE1).unwrap() + chrono::Duration::minutes(2);
        let err = build_ephemeris_rows(&record, 1.0, now).unwrap_err();
        assert!(matches!(err, StageError::Parse(_)));
    }

    // P1: identical inputs produce pointwise-identical rows, which is what
    // makes the `ON CONFLICT (satellite_id, timestamp) DO UPDATE` upsert
    // idempotent across repeated runs with the same TLE snapshot.
    #[test]
    fn build_ephemeris_rows_is_deterministic() {
        let record = tle(3, VALID_LINE1, VALID_LINE2);
        // 2 minutes past epoch, matching end-to-end scenario 2 in shape:
        // stop_time_min = (2min + 3h) / 1min = 182.
        let now = parse_tle_epoch(VALID_LINE1).unwrap() + chrono::Duration::minutes(2);

        let first = build_ephemeris_rows(&record, 1.0, now).unwrap();
        let second = build_ephemeris_rows(&record, 1.0, now).unwrap();

        assert!(!first.is_empty());
        assert_eq!(first.len(), 183);
        assert_eq!(first, second);
    }

    #[test]
    fn row_is_complete_rejects_non_finite_fields() {
        let mut row = PropagatedRow {
            tsince_min: 0.0,
            x_km: 1.0,
            y_km: 2.0,
            z_km: 3.0,
            vx_km_s: 0.1,
            vy_km_s: 0.2,
            vz_km_s: 0.3,
        };
        assert!(row_is_complete(&row));

        row.x_km = f64::NAN;
        assert!(!row_is_complete(&row));

        row.x_km = 1.0;
        row.vz_km_s = f64::INFINITY;
        assert!(!row_is_complete(&row));
    }
}
