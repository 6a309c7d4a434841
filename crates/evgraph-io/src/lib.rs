#![forbid(unsafe_code)]
//! evgraph-io: the engine's external data collaborators.
//!
//! - `DatasetSource`: schema/row count and row-range reads
//!   (`MemorySource`, `JsonlSource`).
//! - `SnapshotSink`: writes selected rows of a snapshot action
//!   (`FsSink`, `MemorySink`) through `JsonlWriter`.
//!
//! Errors are `IoError` here and surface as `Error::IoFailure` in the engine.

pub mod error;
pub mod memory;
pub mod readers;
pub mod sink;
pub mod source;
pub mod writers;

pub use error::IoError;
pub use memory::MemorySource;
pub use readers::jsonl::JsonlSource;
pub use sink::{FsSink, MemoryOutput, MemorySink, SnapshotSink, WriteStats};
pub use source::{DatasetInfo, DatasetSource};
pub use writers::jsonl::JsonlWriter;
