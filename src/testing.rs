//! Test helpers shared by the unit and integration suites.

use crate::model::Series;

/// Comparison tolerance for evaluated values.
const EPSILON: f64 = 1e-10;

/// Builds a series the way a storage fetch delivers one: NaN inputs mark
/// absent points and their stored values are zeroed.
pub fn series(name: &str, values: &[f64], step_time: i32, start_time: i32) -> Series {
    Series::of(name, start_time, step_time, values)
}

/// Elementwise comparison against NaN-marked expectations. Both sides
/// absent is equal; one side absent is unequal; otherwise values must
/// agree within `1e-10`.
pub fn nearly_equal(series: &Series, want: &[f64]) -> bool {
    if series.values.len() != want.len() {
        return false;
    }
    for (i, &w) in want.iter().enumerate() {
        match series.value_at(i) {
            None => {
                if !w.is_nan() {
                    return false;
                }
            }
            Some(v) => {
                if w.is_nan() || (v - w).abs() > EPSILON {
                    return false;
                }
            }
        }
    }
    true
}
