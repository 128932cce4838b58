//! Wire shape for evaluated series.
//!
//! The render front-end (out of scope here) serializes evaluator output
//! as JSON. Absence travels as the parallel `absent` boolean array, never
//! as NaN sentinels; absent slots in `values` hold `0.0`.

use serde::{Deserialize, Serialize};

use crate::model::Series;

/// One series of a render response. Field names follow the wire contract:
/// camelCase time coordinates, `values` with zeroed absents, and the
/// authoritative `absent` array. Every field is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesResponse {
    pub name: String,
    pub start_time: i32,
    pub stop_time: i32,
    pub step_time: i32,
    pub values: Vec<f64>,
    pub absent: Vec<bool>,
}

impl From<&Series> for SeriesResponse {
    fn from(series: &Series) -> Self {
        Self {
            name: series.name.clone(),
            start_time: series.start_time,
            stop_time: series.stop_time,
            step_time: series.step_time,
            values: series.values.clone(),
            absent: series.absent.clone(),
        }
    }
}

impl From<Series> for SeriesResponse {
    fn from(series: Series) -> Self {
        Self {
            name: series.name,
            start_time: series.start_time,
            stop_time: series.stop_time,
            step_time: series.step_time,
            values: series.values,
            absent: series.absent,
        }
    }
}
