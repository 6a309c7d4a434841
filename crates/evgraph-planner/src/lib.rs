#![forbid(unsafe_code)]
//! evgraph-planner: from graph nodes to an executable program.
//!
//! Design:
//! - `graph` is the immutable node model; every builder validates eagerly.
//! - `variation` tracks which variant tags each value depends on.
//! - `partition` turns a row span plus a policy into disjoint partitions.
//! - `lower` compiles the pending actions of a binding into one `Program`
//!   that a worker runs in a single pass per partition.
//! - `dsl::yaml` reads analysis files for the CLI.
//!
//! No threads and no I/O here; exec owns both.

pub mod dsl;
pub mod graph;
pub mod lower;
pub mod partition;
pub mod variation;

pub use dsl::yaml::{parse_yaml_analysis, ActionDecl, AnalysisConfig, GraphStep, ParsedAnalysis};
pub use graph::{ColumnBinding, GraphContext, GraphNode, NodeKind, Scope};
pub use lower::{lower_actions, BoundExpr, FilterDef, Program, ProgramAction, SlotDef};
pub use partition::{plan_partitions, Partition, PartitionPolicy};
pub use variation::TagSet;
