//! The Graphite function library.
//!
//! Every function consumes evaluated input series and produces fresh
//! output series; inputs are never mutated in place (the evaluator hands
//! each function its own clones). Output series copy `start_time` and
//! `step_time` from their primary input, except `summarize` which
//! re-buckets. The output name is the rendered invocation,
//! `function(argString)` with the verbatim argument slice, except for the
//! renaming functions `alias` and `aliasByNode`.
//!
//! Absent handling is uniform: an input point whose absent flag is set is
//! missing, and an output point is emitted absent whenever its defining
//! expression would be undefined. Division by zero and friends are absent
//! points, never panics.

use std::collections::HashMap;

use crate::model::Series;
use crate::query::evaluator::{EvalError, EvalResult, FunctionCall};
use crate::query::interval::parse_interval;

/// A function invocable from a query target.
pub(crate) trait SeriesFunction: Send + Sync {
    /// Applies the function to the given invocation.
    fn apply(&self, call: &FunctionCall<'_>) -> EvalResult<Vec<Series>>;
}

/// Function registry mapping invocation targets to implementations.
///
/// Lookup is exact and case-sensitive. `sum` and `avg` are registered
/// aliases of `sumSeries` and `averageSeries`; aliased invocations still
/// render under the canonical name.
pub(crate) struct FunctionRegistry {
    functions: HashMap<&'static str, Box<dyn SeriesFunction>>,
}

impl FunctionRegistry {
    pub(crate) fn new() -> Self {
        let mut functions: HashMap<&'static str, Box<dyn SeriesFunction>> = HashMap::new();

        // Aggregation across series
        functions.insert("sum", Box::new(SumSeries));
        functions.insert("sumSeries", Box::new(SumSeries));
        functions.insert("avg", Box::new(AverageSeries));
        functions.insert("averageSeries", Box::new(AverageSeries));
        functions.insert("maxSeries", Box::new(MaxSeries));
        functions.insert("minSeries", Box::new(MinSeries));
        functions.insert("diffSeries", Box::new(DiffSeries));
        functions.insert("divideSeries", Box::new(DivideSeries));

        // Per-point transforms
        functions.insert("scale", Box::new(Scale));
        functions.insert("scaleToSeconds", Box::new(ScaleToSeconds));
        functions.insert("offset", Box::new(Offset));
        functions.insert("absolute", Box::new(Absolute));
        functions.insert("transformNull", Box::new(TransformNull));
        functions.insert("keepLastValue", Box::new(KeepLastValue));

        // Windowed and derived
        functions.insert("derivative", Box::new(Derivative));
        functions.insert("nonNegativeDerivative", Box::new(NonNegativeDerivative));
        functions.insert("movingAverage", Box::new(MovingAverage));
        functions.insert("summarize", Box::new(Summarize));

        // Naming
        functions.insert("alias", Box::new(Alias));
        functions.insert("aliasByNode", Box::new(AliasByNode));

        Self { functions }
    }

    pub(crate) fn get(&self, name: &str) -> Option<&dyn SeriesFunction> {
        self.functions.get(name).map(|f| f.as_ref())
    }
}

/// True when every series shares start and step, the precondition for
/// index-wise aggregation. Differing lengths are fine; short inputs are
/// treated as absent tails.
fn aligned(series: &[Series]) -> bool {
    series
        .windows(2)
        .all(|w| w[0].start_time == w[1].start_time && w[0].step_time == w[1].step_time)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Index-wise aggregation over the flattened series arguments. `fold`
/// sees the non-absent contributions at one index; an index with no
/// contributions is absent.
fn aggregate(
    call: &FunctionCall<'_>,
    rendered: &'static str,
    fold: fn(&[f64]) -> f64,
) -> EvalResult<Vec<Series>> {
    let inputs = call.series_args_from(0)?;
    if inputs.is_empty() {
        return Ok(Vec::new());
    }
    if !aligned(&inputs) {
        return Err(EvalError::MisalignedSeries {
            function: rendered.to_string(),
        });
    }
    let len = inputs.iter().map(Series::len).max().unwrap_or(0);
    let mut out = Series::with_shape(
        format!("{}({})", rendered, call.arg_string()),
        inputs[0].start_time,
        inputs[0].step_time,
        len,
    );
    let mut points = Vec::with_capacity(inputs.len());
    for i in 0..len {
        points.clear();
        points.extend(inputs.iter().filter_map(|s| s.value_at(i)));
        if !points.is_empty() {
            out.set(i, fold(&points));
        }
    }
    Ok(vec![out])
}

/// Applies `op` to every non-absent point of every input series,
/// preserving time coordinates. Absent points pass through absent.
fn map_points(
    inputs: &[Series],
    name: &str,
    op: impl Fn(&Series, f64) -> f64,
) -> Vec<Series> {
    inputs
        .iter()
        .map(|s| {
            let mut out = Series::with_shape(name, s.start_time, s.step_time, s.len());
            for i in 0..s.len() {
                if let Some(v) = s.value_at(i) {
                    out.set(i, op(s, v));
                }
            }
            out
        })
        .collect()
}

/// sumSeries(s1, s2, ...): index-wise sum of the non-absent values.
struct SumSeries;

impl SeriesFunction for SumSeries {
    fn apply(&self, call: &FunctionCall<'_>) -> EvalResult<Vec<Series>> {
        aggregate(call, "sumSeries", |vs| vs.iter().sum())
    }
}

/// averageSeries(s1, s2, ...): index-wise mean of the non-absent values.
struct AverageSeries;

impl SeriesFunction for AverageSeries {
    fn apply(&self, call: &FunctionCall<'_>) -> EvalResult<Vec<Series>> {
        aggregate(call, "averageSeries", mean)
    }
}

/// maxSeries(s1, s2, ...): index-wise maximum of the non-absent values.
struct MaxSeries;

impl SeriesFunction for MaxSeries {
    fn apply(&self, call: &FunctionCall<'_>) -> EvalResult<Vec<Series>> {
        aggregate(call, "maxSeries", |vs| {
            vs.iter().copied().fold(f64::NEG_INFINITY, f64::max)
        })
    }
}

/// minSeries(s1, s2, ...): index-wise minimum of the non-absent values.
struct MinSeries;

impl SeriesFunction for MinSeries {
    fn apply(&self, call: &FunctionCall<'_>) -> EvalResult<Vec<Series>> {
        aggregate(call, "minSeries", |vs| {
            vs.iter().copied().fold(f64::INFINITY, f64::min)
        })
    }
}

/// diffSeries(s, subtrahends...): the first flattened series minus the
/// sum of the non-absent remainder at each index. An absent minuend makes
/// the output point absent; absent subtrahends contribute nothing.
struct DiffSeries;

impl SeriesFunction for DiffSeries {
    fn apply(&self, call: &FunctionCall<'_>) -> EvalResult<Vec<Series>> {
        let inputs = call.series_args_from(0)?;
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        if !aligned(&inputs) {
            return Err(EvalError::MisalignedSeries {
                function: "diffSeries".to_string(),
            });
        }
        let len = inputs.iter().map(Series::len).max().unwrap_or(0);
        let mut out = Series::with_shape(
            format!("diffSeries({})", call.arg_string()),
            inputs[0].start_time,
            inputs[0].step_time,
            len,
        );
        for i in 0..len {
            if let Some(head) = inputs[0].value_at(i) {
                let subtracted: f64 = inputs[1..].iter().filter_map(|s| s.value_at(i)).sum();
                out.set(i, head - subtracted);
            }
        }
        Ok(vec![out])
    }
}

/// divideSeries(dividends, divisor): per-point quotient against a single
/// divisor series. An absent endpoint or a zero divisor makes the output
/// point absent.
struct DivideSeries;

impl SeriesFunction for DivideSeries {
    fn apply(&self, call: &FunctionCall<'_>) -> EvalResult<Vec<Series>> {
        let dividends = call.series_arg(0)?;
        let divisors = call.series_arg(1)?;
        if divisors.len() != 1 {
            return Err(EvalError::WrongArgumentType {
                function: call.function().to_string(),
                index: 1,
                expected: "a single series",
            });
        }
        let divisor = &divisors[0];
        let name = format!("divideSeries({})", call.arg_string());
        let mut results = Vec::with_capacity(dividends.len());
        for s in &dividends {
            if s.start_time != divisor.start_time || s.step_time != divisor.step_time {
                return Err(EvalError::MisalignedSeries {
                    function: "divideSeries".to_string(),
                });
            }
            let mut out = Series::with_shape(name.clone(), s.start_time, s.step_time, s.len());
            for i in 0..s.len() {
                if let (Some(a), Some(b)) = (s.value_at(i), divisor.value_at(i)) {
                    if b != 0.0 {
                        out.set(i, a / b);
                    }
                }
            }
            results.push(out);
        }
        Ok(results)
    }
}

/// scale(s, factor): multiply every non-absent point by a constant.
struct Scale;

impl SeriesFunction for Scale {
    fn apply(&self, call: &FunctionCall<'_>) -> EvalResult<Vec<Series>> {
        let factor = call.float_arg(1)?;
        let inputs = call.series_arg(0)?;
        let name = format!("scale({})", call.arg_string());
        Ok(map_points(&inputs, &name, |_, v| v * factor))
    }
}

/// scaleToSeconds(s, seconds): normalize per-step values to a per-interval
/// rate by multiplying with `seconds / step`.
struct ScaleToSeconds;

impl SeriesFunction for ScaleToSeconds {
    fn apply(&self, call: &FunctionCall<'_>) -> EvalResult<Vec<Series>> {
        let seconds = call.float_arg(1)?;
        let inputs = call.series_arg(0)?;
        let name = format!("scaleToSeconds({})", call.arg_string());
        Ok(map_points(&inputs, &name, |s, v| {
            v * (seconds / s.step_time as f64)
        }))
    }
}

/// offset(s, amount): add a constant to every non-absent point.
struct Offset;

impl SeriesFunction for Offset {
    fn apply(&self, call: &FunctionCall<'_>) -> EvalResult<Vec<Series>> {
        let amount = call.float_arg(1)?;
        let inputs = call.series_arg(0)?;
        let name = format!("offset({})", call.arg_string());
        Ok(map_points(&inputs, &name, |_, v| v + amount))
    }
}

/// absolute(s): elementwise absolute value.
struct Absolute;

impl SeriesFunction for Absolute {
    fn apply(&self, call: &FunctionCall<'_>) -> EvalResult<Vec<Series>> {
        let inputs = call.series_arg(0)?;
        let name = format!("absolute({})", call.arg_string());
        Ok(map_points(&inputs, &name, |_, v| v.abs()))
    }
}

/// transformNull(s, [default=0]): replace absent points with a constant.
/// Every output point is present.
struct TransformNull;

impl SeriesFunction for TransformNull {
    fn apply(&self, call: &FunctionCall<'_>) -> EvalResult<Vec<Series>> {
        let default = call.float_arg_or(1, 0.0)?;
        let inputs = call.series_arg(0)?;
        let name = format!("transformNull({})", call.arg_string());
        Ok(inputs
            .iter()
            .map(|s| {
                let mut out = Series::with_shape(name.clone(), s.start_time, s.step_time, s.len());
                for i in 0..s.len() {
                    out.set(i, s.value_at(i).unwrap_or(default));
                }
                out
            })
            .collect())
    }
}

/// keepLastValue(s, [limit]): carry the last seen value across runs of
/// absent points, filling at most `limit` consecutive points (default
/// unbounded). Leading absents stay absent; once a run overflows the
/// limit, the rest of the run stays absent too.
struct KeepLastValue;

impl SeriesFunction for KeepLastValue {
    fn apply(&self, call: &FunctionCall<'_>) -> EvalResult<Vec<Series>> {
        let limit = call.int_arg_or(1, i64::MAX)?;
        let inputs = call.series_arg(0)?;
        let name = format!("keepLastValue({})", call.arg_string());
        Ok(inputs
            .iter()
            .map(|s| {
                let mut out = Series::with_shape(name.clone(), s.start_time, s.step_time, s.len());
                let mut last = None;
                let mut filled = 0i64;
                for i in 0..s.len() {
                    match s.value_at(i) {
                        Some(v) => {
                            out.set(i, v);
                            last = Some(v);
                            filled = 0;
                        }
                        None => {
                            if let Some(v) = last {
                                if filled < limit {
                                    out.set(i, v);
                                    filled += 1;
                                }
                            }
                        }
                    }
                }
                out
            })
            .collect())
    }
}

/// derivative(s): per-step difference. The first point, and any point
/// whose own or preceding sample is absent, is absent. The last real
/// value carries across absent gaps.
struct Derivative;

impl SeriesFunction for Derivative {
    fn apply(&self, call: &FunctionCall<'_>) -> EvalResult<Vec<Series>> {
        let inputs = call.series_arg(0)?;
        let name = format!("derivative({})", call.arg_string());
        Ok(inputs
            .iter()
            .map(|s| {
                let mut out = Series::with_shape(name.clone(), s.start_time, s.step_time, s.len());
                let mut prev = None;
                for i in 0..s.len() {
                    let Some(v) = s.value_at(i) else { continue };
                    if let Some(p) = prev {
                        out.set(i, v - p);
                    }
                    prev = Some(v);
                }
                out
            })
            .collect())
    }
}

/// nonNegativeDerivative(s, [max]): like derivative, but a negative delta
/// (counter reset) is absent. With `max`, a reset is instead corrected as
/// a counter wrap, `(max - prev) + cur + 1`, unless the current value
/// exceeds `max`, which stays absent.
struct NonNegativeDerivative;

impl SeriesFunction for NonNegativeDerivative {
    fn apply(&self, call: &FunctionCall<'_>) -> EvalResult<Vec<Series>> {
        let max = call.float_arg_or(1, f64::NAN)?;
        let inputs = call.series_arg(0)?;
        let name = format!("nonNegativeDerivative({})", call.arg_string());
        Ok(inputs
            .iter()
            .map(|s| {
                let mut out = Series::with_shape(name.clone(), s.start_time, s.step_time, s.len());
                let mut prev = None;
                for i in 0..s.len() {
                    let Some(v) = s.value_at(i) else { continue };
                    if let Some(p) = prev {
                        let delta = v - p;
                        if delta >= 0.0 {
                            out.set(i, delta);
                        } else if !max.is_nan() && max >= v {
                            out.set(i, (max - p) + v + 1.0);
                        }
                    }
                    prev = Some(v);
                }
                out
            })
            .collect())
    }
}

/// movingAverage(s, N): arithmetic mean over the trailing window of N
/// samples, counting only the non-absent ones. Early indices use the
/// shorter prefix window.
struct MovingAverage;

impl SeriesFunction for MovingAverage {
    fn apply(&self, call: &FunctionCall<'_>) -> EvalResult<Vec<Series>> {
        let window = call.int_arg(1)?;
        if window < 1 {
            return Err(EvalError::WrongArgumentType {
                function: call.function().to_string(),
                index: 1,
                expected: "a positive integer window",
            });
        }
        let window = window as usize;
        let inputs = call.series_arg(0)?;
        let name = format!("movingAverage({})", call.arg_string());
        Ok(inputs
            .iter()
            .map(|s| {
                let mut out = Series::with_shape(name.clone(), s.start_time, s.step_time, s.len());
                for i in 0..s.len() {
                    let lo = (i + 1).saturating_sub(window);
                    let mut sum = 0.0;
                    let mut count = 0usize;
                    for j in lo..=i {
                        if let Some(v) = s.value_at(j) {
                            sum += v;
                            count += 1;
                        }
                    }
                    if count > 0 {
                        out.set(i, sum / count as f64);
                    }
                }
                out
            })
            .collect())
    }
}

/// alias(s, newName): rename every input series to the literal string.
struct Alias;

impl SeriesFunction for Alias {
    fn apply(&self, call: &FunctionCall<'_>) -> EvalResult<Vec<Series>> {
        let new_name = call.string_arg(1)?.to_string();
        let mut series = call.series_arg(0)?;
        for s in &mut series {
            s.name = new_name.clone();
        }
        Ok(series)
    }
}

/// aliasByNode(s, idx...): rebuild each series name from the dot-separated
/// components of its current name at the given zero-based indices.
/// Out-of-range indices are skipped.
struct AliasByNode;

impl SeriesFunction for AliasByNode {
    fn apply(&self, call: &FunctionCall<'_>) -> EvalResult<Vec<Series>> {
        if call.arg_count() < 2 {
            return Err(EvalError::MissingArgument {
                function: call.function().to_string(),
                index: 1,
            });
        }
        let mut indices = Vec::with_capacity(call.arg_count() - 1);
        for i in 1..call.arg_count() {
            indices.push(call.int_arg(i)?);
        }
        let mut series = call.series_arg(0)?;
        for s in &mut series {
            let parts: Vec<&str> = s.name.split('.').collect();
            let picked: Vec<&str> = indices
                .iter()
                .filter_map(|&i| usize::try_from(i).ok().and_then(|i| parts.get(i)).copied())
                .collect();
            s.name = picked.join(".");
        }
        Ok(series)
    }
}

/// summarize(s, interval, [method]): re-bucket a series to a coarser
/// step. Bucket k aggregates the input samples whose timestamps fall in
/// `[start + k*interval, start + (k+1)*interval)`; buckets are anchored
/// at the series start. Method is one of sum (default), avg, min, max,
/// last; a bucket with no non-absent inputs is absent.
struct Summarize;

impl SeriesFunction for Summarize {
    fn apply(&self, call: &FunctionCall<'_>) -> EvalResult<Vec<Series>> {
        let inputs = call.series_arg(0)?;
        let interval_str = call.string_arg(1)?;
        let interval = parse_interval(interval_str)
            .ok_or_else(|| EvalError::InvalidInterval(interval_str.to_string()))?;
        let method = call.string_arg_or(2, "sum")?;
        let fold: fn(&[f64]) -> f64 = match method {
            "sum" => |vs| vs.iter().sum(),
            "avg" => mean,
            "min" => |vs| vs.iter().copied().fold(f64::INFINITY, f64::min),
            "max" => |vs| vs.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            "last" => |vs| vs[vs.len() - 1],
            _ => {
                return Err(EvalError::WrongArgumentType {
                    function: call.function().to_string(),
                    index: 2,
                    expected: "one of sum, avg, min, max, last",
                })
            }
        };
        let name = format!("summarize({})", call.arg_string());
        let mut results = Vec::with_capacity(inputs.len());
        for s in &inputs {
            let span = s.len() as i64 * s.step_time as i64;
            let interval_i64 = interval as i64;
            let buckets = ((span + interval_i64 - 1) / interval_i64) as usize;
            let mut bucket_points: Vec<Vec<f64>> = vec![Vec::new(); buckets];
            for i in 0..s.len() {
                if let Some(v) = s.value_at(i) {
                    let k = (i as i64 * s.step_time as i64 / interval as i64) as usize;
                    bucket_points[k].push(v);
                }
            }
            let mut out = Series::with_shape(name.clone(), s.start_time, interval, buckets);
            for (k, points) in bucket_points.iter().enumerate() {
                if !points.is_empty() {
                    out.set(k, fold(points));
                }
            }
            results.push(out);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use crate::query::evaluator::{eval, SeriesMap};
    use crate::query::parser::parse_complete;
    use crate::testing::{nearly_equal, series};
    use rstest::rstest;

    const NAN: f64 = f64::NAN;

    /// Parses and evaluates `target` against the given leaf map entries.
    fn run(target: &str, entries: &[(&str, &[f64], i32, i32)]) -> Vec<crate::Series> {
        let mut map = SeriesMap::new();
        for &(path, values, step, start) in entries {
            map.entry(path.to_string())
                .or_insert_with(Vec::new)
                .push(series(path, values, step, start));
        }
        eval(&parse_complete(target).unwrap(), &map)
    }

    #[rstest]
    #[case(
        "sum(metric1,metric2,metric3)",
        &[
            ("metric1", &[1.0, 2.0, 3.0, 4.0, 5.0][..], 1, 100),
            ("metric2", &[2.0, 3.0, NAN, 5.0, 6.0][..], 1, 100),
            ("metric3", &[3.0, 4.0, 5.0, 6.0, NAN][..], 1, 100),
        ],
        &[6.0, 9.0, 8.0, 15.0, 11.0][..],
        "sumSeries(metric1,metric2,metric3)"
    )]
    #[case(
        "sumSeries(metric1,metric2,metric3)",
        &[
            ("metric1", &[1.0, 2.0, 3.0, 4.0, 5.0][..], 1, 100),
            ("metric2", &[2.0, 3.0, NAN, 5.0, 6.0][..], 1, 100),
            ("metric3", &[3.0, 4.0, 5.0, 6.0, NAN][..], 1, 100),
        ],
        &[6.0, 9.0, 8.0, 15.0, 11.0][..],
        "sumSeries(metric1,metric2,metric3)"
    )]
    #[case(
        "nonNegativeDerivative(metric1)",
        &[("metric1", &[2.0, 4.0, 6.0, 10.0, 14.0, 20.0][..], 1, 100)],
        &[NAN, 2.0, 2.0, 4.0, 4.0, 6.0][..],
        "nonNegativeDerivative(metric1)"
    )]
    #[case(
        "nonNegativeDerivative(metric1)",
        &[("metric1", &[2.0, 4.0, 6.0, 1.0, 4.0, NAN, 8.0][..], 1, 100)],
        &[NAN, 2.0, 2.0, NAN, 3.0, NAN, 4.0][..],
        "nonNegativeDerivative(metric1)"
    )]
    #[case(
        "derivative(metric1)",
        &[("metric1", &[2.0, 4.0, 6.0, 1.0, 4.0, NAN, 8.0][..], 1, 100)],
        &[NAN, 2.0, 2.0, -5.0, 3.0, NAN, 4.0][..],
        "derivative(metric1)"
    )]
    #[case(
        "movingAverage(metric1,4)",
        &[("metric1", &[2.0, 4.0, 6.0, 4.0, 6.0, 8.0][..], 1, 100)],
        &[2.0, 3.0, 4.0, 4.0, 5.0, 6.0][..],
        "movingAverage(metric1,4)"
    )]
    #[case(
        "scale(metric1,2.5)",
        &[("metric1", &[1.0, 2.0, NAN, 4.0, 5.0][..], 1, 100)],
        &[2.5, 5.0, NAN, 10.0, 12.5][..],
        "scale(metric1,2.5)"
    )]
    #[case(
        "scaleToSeconds(metric1,5)",
        &[("metric1", &[60.0, 120.0, NAN, 120.0, 120.0][..], 60, 100)],
        &[5.0, 10.0, NAN, 10.0, 10.0][..],
        "scaleToSeconds(metric1,5)"
    )]
    #[case(
        "keepLastValue(metric1,3)",
        &[("metric1", &[NAN, 2.0, NAN, NAN, NAN, NAN, 4.0, 5.0][..], 1, 100)],
        &[NAN, 2.0, 2.0, 2.0, 2.0, NAN, 4.0, 5.0][..],
        "keepLastValue(metric1,3)"
    )]
    #[case(
        "keepLastValue(metric1)",
        &[("metric1", &[NAN, 2.0, NAN, NAN, NAN, NAN, 4.0, 5.0][..], 1, 100)],
        &[NAN, 2.0, 2.0, 2.0, 2.0, 2.0, 4.0, 5.0][..],
        "keepLastValue(metric1)"
    )]
    #[case(
        "alias(metric1,'renamed')",
        &[("metric1", &[1.0, 2.0, 3.0, 4.0, 5.0][..], 1, 100)],
        &[1.0, 2.0, 3.0, 4.0, 5.0][..],
        "renamed"
    )]
    #[case(
        "aliasByNode(metric1.foo.bar.baz,1)",
        &[("metric1.foo.bar.baz", &[1.0, 2.0, 3.0, 4.0, 5.0][..], 1, 100)],
        &[1.0, 2.0, 3.0, 4.0, 5.0][..],
        "foo"
    )]
    #[case(
        "aliasByNode(metric1.foo.bar.baz,1,3)",
        &[("metric1.foo.bar.baz", &[1.0, 2.0][..], 1, 100)],
        &[1.0, 2.0][..],
        "foo.baz"
    )]
    #[case(
        "averageSeries(metric1,metric2)",
        &[
            ("metric1", &[1.0, NAN, 3.0][..], 1, 100),
            ("metric2", &[3.0, NAN, 5.0][..], 1, 100),
        ],
        &[2.0, NAN, 4.0][..],
        "averageSeries(metric1,metric2)"
    )]
    #[case(
        "avg(metric1,metric2)",
        &[
            ("metric1", &[1.0, 2.0][..], 1, 100),
            ("metric2", &[3.0, 4.0][..], 1, 100),
        ],
        &[2.0, 3.0][..],
        "averageSeries(metric1,metric2)"
    )]
    #[case(
        "maxSeries(metric1,metric2)",
        &[
            ("metric1", &[1.0, 5.0, NAN][..], 1, 100),
            ("metric2", &[4.0, 2.0, NAN][..], 1, 100),
        ],
        &[4.0, 5.0, NAN][..],
        "maxSeries(metric1,metric2)"
    )]
    #[case(
        "minSeries(metric1,metric2)",
        &[
            ("metric1", &[1.0, 5.0, NAN][..], 1, 100),
            ("metric2", &[4.0, 2.0, 6.0][..], 1, 100),
        ],
        &[1.0, 2.0, 6.0][..],
        "minSeries(metric1,metric2)"
    )]
    #[case(
        "diffSeries(metric1,metric2)",
        &[
            ("metric1", &[5.0, NAN, 7.0, 8.0][..], 1, 100),
            ("metric2", &[1.0, 2.0, NAN, 3.0][..], 1, 100),
        ],
        &[4.0, NAN, 7.0, 5.0][..],
        "diffSeries(metric1,metric2)"
    )]
    #[case(
        "divideSeries(metric1,metric2)",
        &[
            ("metric1", &[6.0, NAN, 8.0, 9.0][..], 1, 100),
            ("metric2", &[2.0, 2.0, 0.0, 3.0][..], 1, 100),
        ],
        &[3.0, NAN, NAN, 3.0][..],
        "divideSeries(metric1,metric2)"
    )]
    #[case(
        "transformNull(metric1)",
        &[("metric1", &[1.0, NAN, 3.0][..], 1, 100)],
        &[1.0, 0.0, 3.0][..],
        "transformNull(metric1)"
    )]
    #[case(
        "transformNull(metric1,-1)",
        &[("metric1", &[1.0, NAN, 3.0][..], 1, 100)],
        &[1.0, -1.0, 3.0][..],
        "transformNull(metric1,-1)"
    )]
    #[case(
        "absolute(metric1)",
        &[("metric1", &[-2.0, NAN, 3.0][..], 1, 100)],
        &[2.0, NAN, 3.0][..],
        "absolute(metric1)"
    )]
    #[case(
        "offset(metric1,10)",
        &[("metric1", &[1.0, NAN, -3.0][..], 1, 100)],
        &[11.0, NAN, 7.0][..],
        "offset(metric1,10)"
    )]
    #[case(
        "nonNegativeDerivative(metric1,100)",
        &[("metric1", &[10.0, 20.0, 5.0, 200.0, 150.0][..], 1, 100)],
        // The drop from 20 to 5 wraps: (100 - 20) + 5 + 1 = 86. The drop
        // to 150 cannot wrap because 150 exceeds the counter maximum.
        &[NAN, 10.0, 86.0, 195.0, NAN][..],
        "nonNegativeDerivative(metric1,100)"
    )]
    fn should_evaluate_function(
        #[case] target: &str,
        #[case] entries: &[(&str, &[f64], i32, i32)],
        #[case] want: &[f64],
        #[case] want_name: &str,
    ) {
        let got = run(target, entries);
        assert_eq!(got.len(), 1, "target: {target}");
        assert!(
            nearly_equal(&got[0], want),
            "target: {target}: got {:?} (absent {:?}), want {:?}",
            got[0].values,
            got[0].absent,
            want
        );
        assert_eq!(got[0].name, want_name, "target: {target}");
        assert!(got[0].step_time > 0, "target: {target}");
    }

    #[test]
    fn should_preserve_time_coordinates_through_transforms() {
        let got = run("scale(metric1,2)", &[("metric1", &[1.0, 2.0, 3.0], 60, 1200)]);
        assert_eq!(got[0].start_time, 1200);
        assert_eq!(got[0].step_time, 60);
        assert_eq!(got[0].stop_time, 1380);
    }

    #[test]
    fn should_pad_shorter_aggregate_inputs_with_absents() {
        let got = run(
            "sumSeries(metric1,metric2)",
            &[
                ("metric1", &[1.0, 2.0, 3.0, 4.0], 1, 100),
                ("metric2", &[10.0, 10.0], 1, 100),
            ],
        );
        assert_eq!(got.len(), 1);
        assert!(nearly_equal(&got[0], &[11.0, 12.0, 3.0, 4.0]));
        assert_eq!(got[0].stop_time, 104);
    }

    #[test]
    fn should_sum_all_series_of_a_wildcard_argument() {
        let mut map = SeriesMap::new();
        map.insert(
            "host.*.cpu".to_string(),
            vec![
                series("host.a.cpu", &[1.0, 2.0], 1, 100),
                series("host.b.cpu", &[10.0, 20.0], 1, 100),
            ],
        );
        let got = eval(&parse_complete("sumSeries(host.*.cpu)").unwrap(), &map);
        assert_eq!(got.len(), 1);
        assert!(nearly_equal(&got[0], &[11.0, 22.0]));
        assert_eq!(got[0].name, "sumSeries(host.*.cpu)");
    }

    #[test]
    fn should_emit_absent_when_every_contribution_is_absent() {
        let got = run(
            "sumSeries(metric1,metric2)",
            &[
                ("metric1", &[NAN, 1.0], 1, 100),
                ("metric2", &[NAN, 2.0], 1, 100),
            ],
        );
        assert!(nearly_equal(&got[0], &[NAN, 3.0]));
        // Absent points store zero for the wire.
        assert_eq!(got[0].values[0], 0.0);
    }

    #[test]
    fn should_apply_alias_to_every_series() {
        let mut map = SeriesMap::new();
        map.insert(
            "host.*.cpu".to_string(),
            vec![
                series("host.a.cpu", &[1.0], 1, 100),
                series("host.b.cpu", &[2.0], 1, 100),
            ],
        );
        let got = eval(&parse_complete("alias(host.*.cpu,'cpu')").unwrap(), &map);
        assert_eq!(got.len(), 2);
        assert!(got.iter().all(|s| s.name == "cpu"));
    }

    #[test]
    fn should_alias_each_series_by_its_own_nodes() {
        let mut map = SeriesMap::new();
        map.insert(
            "host.*.cpu".to_string(),
            vec![
                series("host.a.cpu", &[1.0], 1, 100),
                series("host.b.cpu", &[2.0], 1, 100),
            ],
        );
        let got = eval(&parse_complete("aliasByNode(host.*.cpu,1)").unwrap(), &map);
        assert_eq!(got[0].name, "a");
        assert_eq!(got[1].name, "b");
    }

    #[test]
    fn should_skip_out_of_range_alias_nodes() {
        let got = run("aliasByNode(a.b,5)", &[("a.b", &[1.0], 1, 0)]);
        assert_eq!(got[0].name, "");
    }

    #[test]
    fn should_keep_leading_absents_in_keep_last_value() {
        let got = run("keepLastValue(metric1)", &[("metric1", &[NAN, NAN, 3.0], 1, 0)]);
        assert!(nearly_equal(&got[0], &[NAN, NAN, 3.0]));
    }

    #[test]
    fn should_average_only_present_samples_in_window() {
        let got = run(
            "movingAverage(metric1,3)",
            &[("metric1", &[2.0, NAN, 4.0, NAN, NAN, NAN], 1, 0)],
        );
        // Window means skip absents; an all-absent window is absent.
        assert!(nearly_equal(&got[0], &[2.0, 2.0, 3.0, 4.0, 4.0, NAN]));
    }

    mod summarize {
        use super::*;

        const JAGGED: [f64; 25] = [
            1.0, 0.0, 0.0, 0.5, 1.0, 2.0, 1.0, 1.0, 1.5, 2.0, 3.0, 2.0, 2.0, 1.5, 3.0, 4.0, 3.0,
            2.0, 3.0, 4.5, 5.0, 5.0, 5.0, 5.0, 5.0,
        ];

        const STEPPED: [f64; 25] = [
            1.0, 1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0, 2.0, 3.0, 3.0, 3.0, 3.0, 3.0, 4.0, 4.0,
            4.0, 4.0, 4.0, 5.0, 5.0, 5.0, 5.0, 5.0,
        ];

        #[rstest]
        #[case("summarize(metric1,'5s')", &STEPPED, &[5.0, 10.0, 15.0, 20.0, 25.0][..], "summarize(metric1,'5s')")]
        #[case("summarize(metric1,'5s','avg')", &STEPPED, &[1.0, 2.0, 3.0, 4.0, 5.0][..], "summarize(metric1,'5s','avg')")]
        #[case("summarize(metric1,'5s','max')", &JAGGED, &[1.0, 2.0, 3.0, 4.5, 5.0][..], "summarize(metric1,'5s','max')")]
        #[case("summarize(metric1,'5s','min')", &JAGGED, &[0.0, 1.0, 1.5, 2.0, 5.0][..], "summarize(metric1,'5s','min')")]
        #[case("summarize(metric1,'5s','last')", &JAGGED, &[1.0, 2.0, 3.0, 4.5, 5.0][..], "summarize(metric1,'5s','last')")]
        fn should_summarize(
            #[case] target: &str,
            #[case] input: &[f64],
            #[case] want: &[f64],
            #[case] want_name: &str,
        ) {
            let start = 1_400_000_000;
            let got = run(target, &[("metric1", input, 1, start)]);
            assert_eq!(got.len(), 1, "target: {target}");
            assert!(
                nearly_equal(&got[0], want),
                "target: {target}: got {:?}, want {:?}",
                got[0].values,
                want
            );
            assert_eq!(got[0].name, want_name);
            assert_eq!(got[0].step_time, 5);
            assert_eq!(got[0].start_time, start);
            assert_eq!(got[0].stop_time, start + 25);
        }

        #[test]
        fn should_round_partial_trailing_bucket_up() {
            // 7 samples at step 1 into 5s buckets: the second bucket only
            // covers two samples but still appears.
            let got = run(
                "summarize(metric1,'5s')",
                &[("metric1", &[1.0; 7], 1, 1000)],
            );
            assert!(nearly_equal(&got[0], &[5.0, 2.0]));
            assert_eq!(got[0].stop_time, 1010);
        }

        #[test]
        fn should_emit_absent_for_empty_buckets() {
            let got = run(
                "summarize(metric1,'2s')",
                &[("metric1", &[1.0, 1.0, NAN, NAN, 3.0, 3.0], 1, 1000)],
            );
            assert!(nearly_equal(&got[0], &[2.0, NAN, 6.0]));
        }

        #[test]
        fn should_rebucket_coarser_steps() {
            // 1min of data at step 10 into 30s buckets.
            let got = run(
                "summarize(metric1,'30s')",
                &[("metric1", &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 10, 600)],
            );
            assert!(nearly_equal(&got[0], &[6.0, 15.0]));
            assert_eq!(got[0].step_time, 30);
        }

        #[test]
        fn should_absorb_bad_interval() {
            let got = run("summarize(metric1,'5x')", &[("metric1", &[1.0], 1, 0)]);
            assert!(got.is_empty());
        }

        #[test]
        fn should_absorb_unknown_method() {
            let got = run(
                "summarize(metric1,'5s','median')",
                &[("metric1", &[1.0], 1, 0)],
            );
            assert!(got.is_empty());
        }
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        /// Sample values as a fetch would produce them: finite or missing.
        fn fetched_values() -> impl Strategy<Value = Vec<f64>> {
            prop::collection::vec(
                prop_oneof![
                    4 => (-1.0e6..1.0e6),
                    1 => Just(f64::NAN),
                ],
                1..64,
            )
        }

        proptest! {
            /// Every evaluator output satisfies the series invariants:
            /// parallel arrays, the stop identity, a positive step, and
            /// zero-stored absents.
            #[test]
            fn outputs_are_well_formed(
                values in fetched_values(),
                window in 1i64..10,
                interval in 1i32..20,
                start in 0i32..1_000_000,
                step in prop::sample::select(vec![1i32, 5, 10, 60]),
            ) {
                let targets = [
                    format!("movingAverage(metric1,{window})"),
                    format!("keepLastValue(metric1,{window})"),
                    format!("summarize(metric1,'{interval}s')"),
                    "nonNegativeDerivative(metric1)".to_string(),
                    "derivative(metric1)".to_string(),
                    "transformNull(metric1)".to_string(),
                    "sumSeries(metric1,metric1)".to_string(),
                ];
                for target in &targets {
                    let got = run(target, &[("metric1", values.as_slice(), step, start)]);
                    for g in &got {
                        prop_assert_eq!(g.values.len(), g.absent.len());
                        prop_assert_eq!(
                            g.stop_time,
                            g.start_time + g.values.len() as i32 * g.step_time,
                            "stop identity violated for {}", target
                        );
                        prop_assert!(g.step_time > 0);
                        for (v, &a) in g.values.iter().zip(g.absent.iter()) {
                            prop_assert!(!v.is_nan(), "NaN stored by {}", target);
                            if a {
                                prop_assert_eq!(*v, 0.0, "absent point not zeroed by {}", target);
                            }
                        }
                    }
                }
            }

            /// keepLastValue without a limit leaves no gaps after the
            /// first present sample.
            #[test]
            fn keep_last_value_fills_every_gap(values in fetched_values()) {
                let got = run("keepLastValue(metric1)", &[("metric1", values.as_slice(), 1, 0)]);
                let first = values.iter().position(|v| !v.is_nan());
                if let Some(first) = first {
                    for i in first..values.len() {
                        prop_assert!(!got[0].absent[i]);
                    }
                }
            }
        }
    }
}
