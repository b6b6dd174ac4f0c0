//! Row-level data types shared across the propagation and conjunction stages.

use std::fmt;

use chrono::{DateTime, Utc};

/// A satellite's catalog identifier. A thin newtype over the `BIGINT`
/// primary key shared by `satellites`, `satellite_data`, `orbit_data`, and
/// `top_collision_probabilities`, so a raw row index or loop counter can
/// never be passed where an id is expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SatelliteId(pub i64);

impl fmt::Display for SatelliteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SatelliteId {
    fn from(raw: i64) -> Self {
        SatelliteId(raw)
    }
}

impl From<SatelliteId> for i64 {
    fn from(id: SatelliteId) -> Self {
        id.0
    }
}

/// A satellite's orbital elements as stored in `satellite_data`. Read-only
/// input to this engine; never written back.
#[derive(Debug, Clone)]
pub struct TleRecord {
    pub satellite_id: SatelliteId,
    pub tle_line1: String,
    pub tle_line2: String,
}

/// One position/velocity sample produced by the SGP4 adapter, still in the
/// propagator's own `tsince_min` time base (not yet shifted to a UTC
/// instant — see `epoch::shift_timestamp`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropagatedRow {
    pub tsince_min: f64,
    pub x_km: f64,
    pub y_km: f64,
    pub z_km: f64,
    pub vx_km_s: f64,
    pub vy_km_s: f64,
    pub vz_km_s: f64,
}

/// One row of the `orbit_data` time series, ready to upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct EphemerisRow {
    pub satellite_id: SatelliteId,
    pub timestamp_utc: DateTime<Utc>,
    pub x_km: f64,
    pub y_km: f64,
    pub z_km: f64,
    pub vx_km_s: f64,
    pub vy_km_s: f64,
    pub vz_km_s: f64,
}

/// A satellite's in-plane position at the reference instant, as loaded for
/// Phase 2's pairwise probability computation. Velocity is part of the
/// stored state but unused by the reduced 2-D probability model.
#[derive(Debug, Clone, Copy)]
pub struct StateVector {
    pub satellite_id: SatelliteId,
    pub x_km: f64,
    pub y_km: f64,
    pub z_km: f64,
}

/// One row of the `top_collision_probabilities` table.
#[derive(Debug, Clone, PartialEq)]
pub struct ConjunctionRanking {
    pub satellite_id: SatelliteId,
    pub rank: i16,
    pub other_satellite_id: SatelliteId,
    pub probability: f64,
    pub calculation_time: DateTime<Utc>,
}
