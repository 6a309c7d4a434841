//! Convenient re-exports for downstream crates.

pub use crate::action::{ActionKind, HistoModel, SnapshotOptions};
pub use crate::config::EngineConfig;
pub use crate::error::{Error, Result};
pub use crate::expr::{call, col, lit, BinaryOp, Expr, UnaryOp};
pub use crate::histogram::Histogram1D;
pub use crate::id::{ActionId, BindingId, NodeId, PartitionId, SlotId};
pub use crate::manifest::{ManifestId, RunManifest};
pub use crate::result::{ActionResult, SnapshotSummary, VariantResult, NOMINAL};
pub use crate::schema::{DataType, Field, Schema};
pub use crate::spec::{DatasetSpec, Sample, SampleSource, SpecVersion, VersionedSpec};
pub use crate::types::{Column, RowBatch, Scalar};
