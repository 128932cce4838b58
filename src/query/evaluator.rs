//! Expression evaluation.
//!
//! The evaluator walks a parsed [`Expr`] against a pre-populated
//! [`SeriesMap`] and produces output series. It does no I/O: the data
//! plane resolves every metric leaf (see [`Expr::metrics`]) against
//! storage before evaluation and hands the results in.
//!
//! Evaluation failures are soft. Wrong arity, a wrong argument type, an
//! unknown function, or misaligned aggregate inputs yield an empty series
//! list for the offending call, so a single malformed subexpression never
//! aborts the surrounding query. Upstream callers treat an empty response
//! as "no data". Parse failures, by contrast, are hard errors reported by
//! [`crate::query::parser::parse`].

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use crate::model::Series;
use crate::query::functions::FunctionRegistry;
use crate::query::parser::{CallExpr, Expr};

/// Map from metric path to the series fetched for it. A wildcard path may
/// resolve to many series; the list order equals the storage fetch order
/// and is preserved through evaluation.
pub type SeriesMap = HashMap<String, Vec<Series>>;

/// Error type for expression evaluation. These never escape
/// [`Evaluator::eval`]; they are absorbed into empty results per the
/// permissive render contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// The call target is not a registered function.
    UnknownFunction(String),
    /// A required argument was not supplied.
    MissingArgument { function: String, index: usize },
    /// An argument had the wrong type.
    WrongArgumentType {
        function: String,
        index: usize,
        expected: &'static str,
    },
    /// Aggregate inputs do not share start and step.
    MisalignedSeries { function: String },
    /// A duration string could not be parsed.
    InvalidInterval(String),
}

impl Display for EvalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalError::UnknownFunction(name) => write!(f, "unknown function: {}", name),
            EvalError::MissingArgument { function, index } => {
                write!(f, "{}: missing argument {}", function, index)
            }
            EvalError::WrongArgumentType {
                function,
                index,
                expected,
            } => write!(f, "{}: argument {} must be {}", function, index, expected),
            EvalError::MisalignedSeries { function } => {
                write!(f, "{}: input series are not aligned", function)
            }
            EvalError::InvalidInterval(s) => write!(f, "invalid interval: {:?}", s),
        }
    }
}

impl std::error::Error for EvalError {}

/// Result type alias for evaluation.
pub(crate) type EvalResult<T> = std::result::Result<T, EvalError>;

/// Evaluates `expr` against the fetched series in `series`.
///
/// Convenience wrapper over [`Evaluator`] for single queries.
#[tracing::instrument(level = "debug", skip_all)]
pub fn eval(expr: &Expr, series: &SeriesMap) -> Vec<Series> {
    Evaluator::new(series).eval(expr)
}

/// Walks expression trees and dispatches calls into the function library.
///
/// The evaluator holds no mutable state and touches nothing shared, so
/// independent queries may evaluate concurrently from many threads, each
/// against its own tree and leaf map. Repeated subexpressions are
/// evaluated repeatedly; the data plane caches fetches, not computations.
pub struct Evaluator<'a> {
    series: &'a SeriesMap,
    registry: FunctionRegistry,
}

impl<'a> Evaluator<'a> {
    /// Creates an evaluator over the given leaf map.
    pub fn new(series: &'a SeriesMap) -> Self {
        Self {
            series,
            registry: FunctionRegistry::new(),
        }
    }

    /// Evaluates one expression tree into its output series.
    ///
    /// A `Name` returns the fetched series for that path (empty when the
    /// path resolved to nothing). Bare literals evaluate to nothing; they
    /// only carry meaning as call arguments. A `Call` dispatches on the
    /// registry, and any [`EvalError`] collapses to an empty list.
    pub fn eval(&self, expr: &Expr) -> Vec<Series> {
        match expr {
            Expr::Name(path) => self.series.get(path).cloned().unwrap_or_default(),
            Expr::Const(_) | Expr::String(_) => Vec::new(),
            Expr::Call(call) => match self.eval_call(call) {
                Ok(series) => series,
                Err(err) => {
                    tracing::debug!(function = %call.function, error = %err, "call evaluation failed");
                    Vec::new()
                }
            },
        }
    }

    fn eval_call(&self, call: &CallExpr) -> EvalResult<Vec<Series>> {
        let function = self
            .registry
            .get(&call.function)
            .ok_or_else(|| EvalError::UnknownFunction(call.function.clone()))?;
        function.apply(&FunctionCall {
            call,
            evaluator: self,
        })
    }
}

/// A function invocation being evaluated: the call node plus access back
/// into the evaluator for series-valued arguments.
///
/// Raw `Const`/`String` arguments are read with the typed accessors;
/// series arguments are evaluated on demand (and only then), so a
/// function decides which of its arguments are series-valued.
pub(crate) struct FunctionCall<'a> {
    call: &'a CallExpr,
    evaluator: &'a Evaluator<'a>,
}

impl<'a> FunctionCall<'a> {
    /// The invocation target as written in the source.
    pub(crate) fn function(&self) -> &str {
        &self.call.function
    }

    /// The verbatim source slice between the call's parentheses.
    pub(crate) fn arg_string(&self) -> &str {
        &self.call.arg_string
    }

    pub(crate) fn arg_count(&self) -> usize {
        self.call.args.len()
    }

    fn arg(&self, index: usize) -> EvalResult<&Expr> {
        self.call.args.get(index).ok_or_else(|| EvalError::MissingArgument {
            function: self.call.function.clone(),
            index,
        })
    }

    fn wrong_type(&self, index: usize, expected: &'static str) -> EvalError {
        EvalError::WrongArgumentType {
            function: self.call.function.clone(),
            index,
            expected,
        }
    }

    /// Evaluates argument `index` to a series list.
    pub(crate) fn series_arg(&self, index: usize) -> EvalResult<Vec<Series>> {
        Ok(self.evaluator.eval(self.arg(index)?))
    }

    /// Evaluates arguments `index..` and flattens the results, preserving
    /// argument order then fetch order. At least the argument at `index`
    /// must exist.
    pub(crate) fn series_args_from(&self, index: usize) -> EvalResult<Vec<Series>> {
        self.arg(index)?;
        let mut out = Vec::new();
        for arg in &self.call.args[index..] {
            out.extend(self.evaluator.eval(arg));
        }
        Ok(out)
    }

    pub(crate) fn float_arg(&self, index: usize) -> EvalResult<f64> {
        match self.arg(index)? {
            Expr::Const(v) => Ok(*v),
            _ => Err(self.wrong_type(index, "a number")),
        }
    }

    pub(crate) fn float_arg_or(&self, index: usize, default: f64) -> EvalResult<f64> {
        if index >= self.arg_count() {
            Ok(default)
        } else {
            self.float_arg(index)
        }
    }

    /// Integer arguments arrive as numeric literals and are truncated
    /// toward zero.
    pub(crate) fn int_arg(&self, index: usize) -> EvalResult<i64> {
        self.float_arg(index).map(|v| v as i64)
    }

    pub(crate) fn int_arg_or(&self, index: usize, default: i64) -> EvalResult<i64> {
        if index >= self.arg_count() {
            Ok(default)
        } else {
            self.int_arg(index)
        }
    }

    pub(crate) fn string_arg(&self, index: usize) -> EvalResult<&str> {
        match self.arg(index)? {
            Expr::String(s) => Ok(s),
            _ => Err(self.wrong_type(index, "a string")),
        }
    }

    pub(crate) fn string_arg_or(&self, index: usize, default: &'a str) -> EvalResult<&str> {
        if index >= self.arg_count() {
            Ok(default)
        } else {
            self.string_arg(index)
        }
    }
}
