//! Dataset source collaborator.
//!
//! The engine only ever asks two things of a dataset: its schema and row
//! count, and the values of some columns over a row range. Workers call
//! `read_range` once per sample slice of their partition.

use std::ops::Range;

use evgraph_core::schema::{DataType, Field, Schema};
use evgraph_core::types::{RowBatch, Scalar};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetInfo {
    pub schema: Schema,
    pub rows: u64,
}

pub trait DatasetSource: Send + Sync {
    fn open(&self, name: &str) -> Result<DatasetInfo>;

    /// Rows `range` of dataset `name`, restricted to `columns`.
    fn read_range(&self, name: &str, range: Range<u64>, columns: &[String]) -> Result<RowBatch>;
}

/// Schema of a batch from the first non-null value of each column.
/// Columns holding only nulls are typed `Float64`.
pub fn infer_schema(batch: &RowBatch) -> Schema {
    Schema::new(
        batch
            .columns
            .iter()
            .map(|c| {
                let dtype = c
                    .values
                    .iter()
                    .find_map(Scalar::data_type)
                    .unwrap_or(DataType::Float64);
                let nullable = c.values.iter().any(Scalar::is_null);
                Field::new(c.name.clone(), dtype, nullable)
            })
            .collect(),
    )
}
