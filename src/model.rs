//! Core data types for the query engine.
//!
//! This module defines [`Series`], the in-memory representation of a
//! fixed-step time series. Missing samples are tracked by a parallel
//! boolean array rather than NaN sentinels: `absent[i]` is authoritative,
//! and the stored value of an absent point is always `0.0`.

/// A fixed-step time series with a parallel absent-flag array.
///
/// Time coordinates are seconds since the Unix epoch. `start_time` is
/// inclusive, `stop_time` exclusive, and the three fields always satisfy
/// `stop_time == start_time + values.len() * step_time`.
///
/// # Absent points
///
/// `values` and `absent` have identical length. When `absent[i]` is true
/// the sample at index `i` is missing; its stored value is zeroed. A NaN
/// in `values` with `absent[i] == false` is ill-formed and never produced
/// by this crate.
///
/// # Example
///
/// ```
/// use carbonql::Series;
///
/// let s = Series::of("cpu.load", 1000, 60, &[0.5, f64::NAN, 0.7]);
/// assert_eq!(s.stop_time, 1180);
/// assert_eq!(s.value_at(1), None);
/// assert_eq!(s.value_at(2), Some(0.7));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    /// Output label. Initially the metric path; rewritten by `alias`,
    /// `aliasByNode`, and function wrappers.
    pub name: String,
    /// Inclusive start, seconds since epoch.
    pub start_time: i32,
    /// Exclusive stop, seconds since epoch.
    pub stop_time: i32,
    /// Seconds per sample, always >= 1.
    pub step_time: i32,
    /// Sample values. Absent points store `0.0`.
    pub values: Vec<f64>,
    /// Parallel missing-sample flags, same length as `values`.
    pub absent: Vec<bool>,
}

impl Series {
    /// Creates a series from explicit value and absent arrays.
    ///
    /// `stop_time` is derived. Values at absent indices are zeroed so the
    /// stored representation matches the wire contract.
    ///
    /// # Panics
    ///
    /// Panics if the arrays differ in length or `step_time < 1`.
    pub fn new(
        name: impl Into<String>,
        start_time: i32,
        step_time: i32,
        mut values: Vec<f64>,
        absent: Vec<bool>,
    ) -> Self {
        assert_eq!(values.len(), absent.len(), "values/absent length mismatch");
        assert!(step_time >= 1, "step_time must be positive");
        for (v, &a) in values.iter_mut().zip(absent.iter()) {
            if a {
                *v = 0.0;
            }
        }
        let stop_time = start_time + values.len() as i32 * step_time;
        Self {
            name: name.into(),
            start_time,
            stop_time,
            step_time,
            values,
            absent,
        }
    }

    /// Creates a series from values where NaN marks a missing point.
    ///
    /// This mirrors the shape a storage fetch produces: NaN inputs become
    /// absent flags and their stored values are zeroed.
    pub fn of(name: impl Into<String>, start_time: i32, step_time: i32, values: &[f64]) -> Self {
        let absent: Vec<bool> = values.iter().map(|v| v.is_nan()).collect();
        let values: Vec<f64> = values
            .iter()
            .map(|&v| if v.is_nan() { 0.0 } else { v })
            .collect();
        Self::new(name, start_time, step_time, values, absent)
    }

    /// Creates a series with the given time coordinates and every point
    /// initially absent. Functions build their outputs from this shape and
    /// fill in defined points with [`Series::set`].
    pub(crate) fn with_shape(
        name: impl Into<String>,
        start_time: i32,
        step_time: i32,
        len: usize,
    ) -> Self {
        Self {
            name: name.into(),
            start_time,
            stop_time: start_time + len as i32 * step_time,
            step_time,
            values: vec![0.0; len],
            absent: vec![true; len],
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the series has no samples.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `index`, or `None` when the point is absent or out of
    /// range. Out-of-range reads are treated as missing tails so callers
    /// can align series of different lengths without bounds juggling.
    pub fn value_at(&self, index: usize) -> Option<f64> {
        if index < self.values.len() && !self.absent[index] {
            Some(self.values[index])
        } else {
            None
        }
    }

    /// Marks the point at `index` present with the given value.
    pub(crate) fn set(&mut self, index: usize, value: f64) {
        self.values[index] = value;
        self.absent[index] = false;
    }
}
