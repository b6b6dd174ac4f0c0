//! Pure-function wrapper around the `sgp4` crate.
//!
//! The contract is exactly spec.md §4.4: `(tle_line1, tle_line2, t0, t1, dt)
//! -> Vec<PropagatedRow> | PropagationError`. No shared mutable state, so
//! this is safe to call concurrently from as many worker tasks as the pool
//! allows.

use crate::errors::PropagationError;
use crate::models::PropagatedRow;

/// Upper bound on a single invocation's output, per spec.md §4.4.
const MAX_OUTPUT_BYTES: usize = 100 * 1024 * 1024;
const BYTES_PER_ROW: usize = std::mem::size_of::<PropagatedRow>();

pub fn propagate(
    tle_line1: &str,
    tle_line2: &str,
    t0_min: f64,
    t1_min: f64,
    step_min: f64,
) -> Result<Vec<PropagatedRow>, PropagationError> {
    if step_min <= 0.0 || t1_min < t0_min {
        return Err(PropagationError::Propagate {
            tsince_min: t0_min,
            reason: format!(
                "invalid window: t0={t0_min} t1={t1_min} step={step_min}"
            ),
        });
    }

    let steps = (((t1_min - t0_min) / step_min).floor() as usize) + 1;
    let projected_bytes = steps.saturating_mul(BYTES_PER_ROW);
    if projected_bytes > MAX_OUTPUT_BYTES {
        return Err(PropagationError::OutputTooLarge(projected_bytes));
    }

    let elements = sgp4::Elements::from_tle(
        None,
        tle_line1.as_bytes(),
        tle_line2.as_bytes(),
    )
    .map_err(|e| PropagationError::ElementParse(e.to_string()))?;

    let constants = sgp4::Constants::from_elements(&elements)
        .map_err(|e| PropagationError::ElementParse(e.to_string()))?;

    let mut rows = Vec::with_capacity(steps);
    let mut tsince = t0_min;
    while tsince <= t1_min + f64::EPSILON {
        let prediction = constants
            .propagate(sgp4::MinutesSinceEpoch(tsince))
            .map_err(|e| PropagationError::Propagate {
                tsince_min: tsince,
                reason: e.to_string(),
            })?;

        rows.push(PropagatedRow {
            tsince_min: tsince,
            x_km: prediction.position[0],
            y_km: prediction.position[1],
            z_km: prediction.position[2],
            vx_km_s: prediction.velocity[0],
            vy_km_s: prediction.velocity[1],
            vz_km_s: prediction.velocity[2],
        });

        tsince += step_min;
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_step() {
        let err = propagate("l1", "l2", 0.0, 10.0, 0.0).unwrap_err();
        assert!(matches!(err, PropagationError::Propagate { .. }));
    }

    #[test]
    fn rejects_inverted_window() {
        let err = propagate("l1", "l2", 10.0, 5.0, 1.0).unwrap_err();
        assert!(matches!(err, PropagationError::Propagate { .. }));
    }

    #[test]
    fn rejects_output_over_cap() {
        // step so small relative to the window that the projected row count
        // alone exceeds the 100MB cap, without needing a valid TLE.
        let err = propagate("l1", "l2", 0.0, 1_000_000.0, 0.0001).unwrap_err();
        assert!(matches!(err, PropagationError::OutputTooLarge(_)));
    }
}
