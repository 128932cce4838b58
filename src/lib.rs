//! Graphite-compatible time-series query engine.
//!
//! This crate is the expression core of a metrics render pipeline: it
//! parses textual query targets such as
//! `sumSeries(nonNegativeDerivative(host.*.cpu),scale(other,2.5))` into
//! expression trees and evaluates them over fetched series.
//!
//! The engine does no I/O. The surrounding data plane parses a target,
//! collects its metric leaves with [`Expr::metrics`], resolves each leaf
//! against storage, and hands the fetched series back for evaluation:
//!
//! ```
//! use carbonql::{eval, parse_complete, Series, SeriesMap};
//!
//! let expr = parse_complete("scale(app.requests,2.5)").unwrap();
//! assert_eq!(expr.metrics(), vec!["app.requests"]);
//!
//! let mut fetched = SeriesMap::new();
//! fetched.insert(
//!     "app.requests".to_string(),
//!     vec![Series::of("app.requests", 1700000000, 60, &[1.0, f64::NAN, 3.0])],
//! );
//!
//! let result = eval(&expr, &fetched);
//! assert_eq!(result[0].name, "scale(app.requests,2.5)");
//! assert_eq!(result[0].value_at(0), Some(2.5));
//! assert_eq!(result[0].value_at(1), None);
//! ```
//!
//! Parse failures are explicit and carry the offending byte offset.
//! Evaluation failures are soft: a malformed call yields an empty series
//! list rather than aborting the surrounding query, matching the
//! permissive render contract.

pub mod error;
pub mod model;
pub mod query;
pub mod testing;

pub use error::{ParseError, ParseResult};
pub use model::Series;
pub use query::evaluator::{eval, EvalError, Evaluator, SeriesMap};
pub use query::parser::{parse, parse_complete, CallExpr, Expr};
pub use query::response::SeriesResponse;
