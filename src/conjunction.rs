//! Phase 2: load states at a single reference instant, compute the O(N²)
//! pairwise collision-probability matrix, rank each satellite's top-3
//! partners, and persist them, per spec.md §4.7.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::{info, warn};

use crate::db::ConnectionPool;
use crate::models::{ConjunctionRanking, SatelliteId, StateVector};
use crate::worker_pool::WorkerPool;

const N_RADIAL: usize = 100;
const N_ANGULAR: usize = 100;
const HARD_BODY_RADIUS_M: f64 = 10.0;
const SIGMA_XX: f64 = 1.0e4;
const SIGMA_YY: f64 = 1.0e4;
const SIGMA_XY: f64 = 0.0;
const DET_FLOOR: f64 = 1.0e-15;
const UPSERT_BATCH_SIZE: usize = 1000;

/// Runs Phase 2 to completion. Returns the number of ranking rows upserted,
/// for the final success log per spec.md §7.
pub async fn run_phase2(pool: Arc<ConnectionPool>, worker_count: usize) -> Result<usize, sqlx::Error> {
    let reference_timestamp = match select_reference_timestamp(&pool).await? {
        Some(ts) => ts,
        None => {
            warn!("phase 2: no reference timestamp found in orbit_data, aborting phase");
            return Ok(0);
        }
    };

    let states = load_states_at(&pool, reference_timestamp).await?;
    if states.is_empty() {
        warn!("phase 2: no states at reference timestamp, aborting phase");
        return Ok(0);
    }

    info!(
        count = states.len(),
        reference_timestamp = %reference_timestamp,
        "phase 2: computing pairwise collision probabilities"
    );

    let results = compute_pairwise(&states, worker_count).await;
    let rankings = rank_top3(&results, reference_timestamp);

    let rows_written = rankings.len();
    persist_rankings(&pool, &rankings).await?;

    info!(rows_written, "phase 2: complete");
    Ok(rows_written)
}

async fn select_reference_timestamp(
    pool: &ConnectionPool,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT timestamp FROM orbit_data ORDER BY abs(extract(epoch from (timestamp - now()))) ASC LIMIT 1",
    )
    .fetch_optional(pool.raw())
    .await?;

    Ok(row.map(|r| r.get::<DateTime<Utc>, _>("timestamp")))
}

async fn load_states_at(
    pool: &ConnectionPool,
    timestamp: DateTime<Utc>,
) -> Result<Vec<StateVector>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT satellite_id, x_km, y_km, z_km FROM orbit_data WHERE timestamp = $1 ORDER BY satellite_id",
    )
    .bind(timestamp)
    .fetch_all(pool.raw())
    .await?;

    Ok(rows
        .iter()
        .map(|row| StateVector {
            satellite_id: SatelliteId(row.get::<i64, _>("satellite_id")),
            x_km: row.get::<f64, _>("x_km"),
            y_km: row.get::<f64, _>("y_km"),
            z_km: row.get::<f64, _>("z_km"),
        })
        .collect())
}

/// One thread-safe accumulator shared across all pairwise tasks, keyed by
/// `satellite_id`. Guarded by a single mutex held only for the
/// merge-append, per spec.md §4.7's concurrency detail.
type ResultsMap = Mutex<HashMap<SatelliteId, Vec<(SatelliteId, f64)>>>;

async fn compute_pairwise(
    states: &[StateVector],
    worker_count: usize,
) -> HashMap<SatelliteId, Vec<(SatelliteId, f64)>> {
    let states = Arc::new(states.to_vec());
    let results: Arc<ResultsMap> = Arc::new(Mutex::new(HashMap::new()));

    let workers = WorkerPool::new(worker_count);
    for i in 0..states.len() {
        let states = states.clone();
        let results = results.clone();
        workers.add_task(async move {
            let mut local: Vec<(SatelliteId, SatelliteId, f64)> = Vec::new();
            let si = states[i];
            for sj in states.iter().skip(i + 1) {
                let p = collision_probability(&si, sj);
                local.push((si.satellite_id, sj.satellite_id, p));
            }

            let mut guard = results.lock().expect("phase 2 results mutex poisoned");
            for (id_i, id_j, p) in local {
                guard.entry(id_i).or_default().push((id_j, p));
                guard.entry(id_j).or_default().push((id_i, p));
            }
        });
    }
    workers.shutdown().await;

    Arc::try_unwrap(results)
        .map(|mutex| mutex.into_inner().expect("phase 2 results mutex poisoned"))
        .unwrap_or_else(|arc| arc.lock().expect("phase 2 results mutex poisoned").clone())
}

/// The reduced 2-D Gaussian conjunction model, per spec.md §4.7 step 4.
/// Every constant here is part of the wire contract: the integration grid
/// size, covariance, and hard-body radius must match exactly to satisfy
/// P6 (bitwise pair symmetry) and the "two stationary satellites" /
/// "two far satellites" end-to-end scenarios.
fn collision_probability(s1: &StateVector, s2: &StateVector) -> f64 {
    let dx = (s2.x_km - s1.x_km) * 1000.0;
    let dy = (s2.y_km - s1.y_km) * 1000.0;

    let mut det = SIGMA_XX * SIGMA_YY - SIGMA_XY * SIGMA_XY;
    if det < DET_FLOOR {
        det = DET_FLOOR;
    }

    let inv_xx = SIGMA_YY / det;
    let inv_yy = SIGMA_XX / det;
    let inv_xy = -SIGMA_XY / det;

    let normalization = 1.0 / (2.0 * PI * det.sqrt());

    let dr = HARD_BODY_RADIUS_M / N_RADIAL as f64;
    let dtheta = 2.0 * PI / N_ANGULAR as f64;

    let mut total = 0.0;
    for ri in 0..N_RADIAL {
        let r = (ri as f64 + 0.5) * dr;
        for ti in 0..N_ANGULAR {
            let theta = (ti as f64 + 0.5) * dtheta;
            let x = r * theta.cos();
            let y = r * theta.sin();

            let ex = x - dx;
            let ey = y - dy;
            let quad = ex * ex * inv_xx + 2.0 * ex * ey * inv_xy + ey * ey * inv_yy;
            let density = normalization * (-0.5 * quad).exp();

            // polar-coordinate Jacobian factor `r`, midpoint rule in both dimensions
            total += density * r * dr * dtheta;
        }
    }

    total
}

/// Sorts each satellite's partner list by probability descending and keeps
/// the top 3, per spec.md §4.7 step 5.
fn rank_top3(
    results: &HashMap<SatelliteId, Vec<(SatelliteId, f64)>>,
    calculation_time: DateTime<Utc>,
) -> Vec<ConjunctionRanking> {
    let mut rankings = Vec::new();

    let mut ids: Vec<&SatelliteId> = results.keys().collect();
    ids.sort();

    for satellite_id in ids {
        let mut partners = results[satellite_id].clone();
        partners.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        for (rank, (other_satellite_id, probability)) in partners.into_iter().take(3).enumerate() {
            rankings.push(ConjunctionRanking {
                satellite_id: *satellite_id,
                rank: (rank + 1) as i16,
                other_satellite_id,
                probability,
                calculation_time,
            });
        }
    }

    rankings
}

/// Batched multi-row upsert in a single transaction, batch size 1000 value
/// tuples, conflict target `(satellite_id, rank)`, per spec.md §4.7 step 6
/// and §9's resolved open question on the conflict key.
async fn persist_rankings(
    pool: &ConnectionPool,
    rankings: &[ConjunctionRanking],
) -> Result<(), sqlx::Error> {
    if rankings.is_empty() {
        return Ok(());
    }

    let mut tx = pool.raw().begin().await?;

    for batch in rankings.chunks(UPSERT_BATCH_SIZE) {
        let mut builder = sqlx::QueryBuilder::new(
            "INSERT INTO top_collision_probabilities (satellite_id, rank, other_satellite_id, probability, calculation_time) ",
        );
        builder.push_values(batch, |mut b, row| {
            b.push_bind(row.satellite_id.0)
                .push_bind(row.rank)
                .push_bind(row.other_satellite_id.0)
                .push_bind(row.probability)
                .push_bind(row.calculation_time);
        });
        builder.push(
            " ON CONFLICT (satellite_id, rank) DO UPDATE SET \
              other_satellite_id = EXCLUDED.other_satellite_id, \
              probability = EXCLUDED.probability, \
              calculation_time = EXCLUDED.calculation_time",
        );

        if let Err(e) = builder.build().execute(&mut *tx).await {
            tx.rollback().await?;
            return Err(e);
        }
    }

    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(id: i64, x: f64, y: f64) -> StateVector {
        StateVector {
            satellite_id: SatelliteId(id),
            x_km: x,
            y_km: y,
            z_km: 0.0,
        }
    }

    #[test]
    fn coincident_states_give_probability_near_closed_form() {
        let s1 = state(1, 0.0, 0.0);
        let s2 = state(2, 0.0, 0.0);
        let p = collision_probability(&s1, &s2);
        let expected = 1.0 - (-(HARD_BODY_RADIUS_M * HARD_BODY_RADIUS_M) / (2.0 * SIGMA_XX)).exp();
        assert!(
            (p - expected).abs() / expected < 0.01,
            "p={p} expected={expected}"
        );
    }

    #[test]
    fn far_apart_states_give_vanishing_probability() {
        let s1 = state(1, 0.0, 0.0);
        let s2 = state(2, 1_000.0, 0.0); // 1,000 km -> 1e6 m separation
        let p = collision_probability(&s1, &s2);
        assert!(p < 1e-10, "p={p}");
    }

    #[test]
    fn pairwise_computation_is_symmetric() {
        let s1 = state(1, 0.0, 0.0);
        let s2 = state(2, 0.05, -0.02);
        assert_eq!(collision_probability(&s1, &s2), collision_probability(&s1, &s2));
    }

    #[test]
    fn rank_top3_orders_descending_and_caps_at_three() {
        let mut results = HashMap::new();
        results.insert(
            SatelliteId(1),
            vec![
                (SatelliteId(2), 0.1),
                (SatelliteId(3), 0.9),
                (SatelliteId(4), 0.5),
                (SatelliteId(5), 0.3),
            ],
        );
        let now = Utc::now();
        let rankings = rank_top3(&results, now);

        assert_eq!(rankings.len(), 3);
        assert_eq!(rankings[0].other_satellite_id, SatelliteId(3));
        assert_eq!(rankings[0].rank, 1);
        assert_eq!(rankings[1].other_satellite_id, SatelliteId(4));
        assert_eq!(rankings[2].other_satellite_id, SatelliteId(5));
    }
}
