#![forbid(unsafe_code)]
//! evgraph: lazy computation graphs over partitioned event data.
//!
//! Build a graph from a dataset with `define`, `filter` and `vary`, declare
//! actions, and read results: every action registered before the first read
//! runs in one pass per partition. See `evgraph_exec::Engine` for the entry
//! point.

pub use evgraph_core;
pub use evgraph_exec;
pub use evgraph_io;
pub use evgraph_operators;
pub use evgraph_planner;

pub use evgraph_core::prelude::*;
pub use evgraph_exec::{
    change_entry_range, change_spec, clone_result_and_action, run_graphs, variations_for, Engine,
    Frame, Phase, ResultHandle, VariationsHandle,
};
pub use evgraph_io::{JsonlSource, MemorySink, MemorySource};
pub use evgraph_operators::{parse_expr, FnFunction};
pub use evgraph_planner::PartitionPolicy;
