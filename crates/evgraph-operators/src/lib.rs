#![forbid(unsafe_code)]
//! evgraph-operators: expression evaluation and action accumulators.
//!
//! Design intent:
//! - Pure and synchronous; the exec crate owns threads and partitions.
//! - Expressions are typed once at declaration (`infer_type`) and evaluated
//!   row by row during a pass (`evaluate`) under the same rules.
//! - Each action kind has an `ActionOperator` whose partial results merge
//!   through `ActionResult::merge`.

pub mod builtins;
pub mod eval;
pub mod functions;
pub mod parse;
pub mod registry;
pub mod traits;

pub mod count;
pub mod histo;
pub mod snapshot;
pub mod sum;

pub use eval::{evaluate, infer_type, RowContext};
pub use functions::{FnFunction, FunctionRegistry, ScalarFunction};
pub use parse::parse_expr;
pub use registry::make_operator;
pub use traits::ActionOperator;
