#![forbid(unsafe_code)]
//! evgraph-exec: workers, pools, the lazy scheduler, respec, and the engine API.
//!
//! A trigger lowers the pending actions of a binding into one program, plans
//! partitions over the bound spec, runs one worker pass per partition on the
//! pool, merges partials in partition order, and caches the merged results.

pub mod layout;
pub mod metrics;
pub mod pool;
pub mod replay;
pub mod respec;
pub mod runtime;
pub mod scheduler;
pub mod worker;

pub use layout::Layout;
pub use metrics::PassCounter;
pub use pool::{InlinePool, RayonPool, WorkerPool};
pub use respec::{change_entry_range, change_spec, clone_result_and_action};
pub use runtime::{run_graphs, variations_for, Analysis, Engine, Frame, ResultHandle, VariationsHandle};
pub use scheduler::{Binding, Computed, Phase};
pub use worker::{BoundGraph, PartialResults, Worker};
