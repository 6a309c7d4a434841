//! Action operator trait.
//!
//! The exec worker builds one operator per action when a partition pass
//! starts, calls `init` once per variant, then `fill` for every row that
//! passes the action's filter chain. Partials are merged by the scheduler
//! through `ActionResult::merge`.

use evgraph_core::error::Result;
use evgraph_core::result::ActionResult;
use evgraph_core::schema::DataType;
use evgraph_core::types::Scalar;

/// Trait that all action accumulators implement.
///
/// Invariants:
/// - `fill` must be deterministic given the same rows in the same order.
/// - `init` returns the identity of the result's merge.
pub trait ActionOperator: Send + Sync {
    /// Stable operator name.
    fn name(&self) -> &'static str;

    /// Validate input column types at declaration time.
    fn check(&self, inputs: &[DataType]) -> Result<()>;

    /// Empty accumulator.
    fn init(&self) -> ActionResult;

    /// Accumulate one selected row. `values` are aligned with
    /// `ActionKind::input_columns`.
    fn fill(&self, acc: &mut ActionResult, values: &[Scalar]) -> Result<()>;
}
