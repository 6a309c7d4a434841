//! In-memory dataset source for tests and embedding.
//!
//! Provides a HashMap-backed source keyed by dataset name. Cloning the
//! source shares the underlying map.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard};

use evgraph_core::types::RowBatch;

use crate::error::{IoError, Result};
use crate::source::{infer_schema, DatasetInfo, DatasetSource};

#[derive(Clone, Default)]
pub struct MemorySource {
    data: Arc<Mutex<HashMap<String, Arc<RowBatch>>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Arc<RowBatch>>>> {
        self.data
            .lock()
            .map_err(|_| IoError::Format("memory source lock poisoned".into()))
    }

    /// Add (or replace) a dataset. Columns must have equal length and one
    /// value type each.
    pub fn insert(&self, name: impl Into<String>, batch: RowBatch) -> Result<()> {
        let name = name.into();
        let rows = batch.num_rows();
        for c in &batch.columns {
            if c.len() != rows {
                return Err(IoError::Format(format!(
                    "dataset '{}': column '{}' has {} rows, expected {}",
                    name,
                    c.name,
                    c.len(),
                    rows
                )));
            }
            let mut types = c.values.iter().filter_map(|v| v.data_type());
            if let Some(first) = types.next() {
                if types.any(|t| t != first) {
                    return Err(IoError::Format(format!(
                        "dataset '{}': column '{}' mixes value types",
                        name, c.name
                    )));
                }
            }
        }
        self.lock()?.insert(name, Arc::new(batch));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().map(|d| d.contains_key(name)).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remove(&self, name: &str) -> Result<()> {
        self.lock()?.remove(name);
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Arc<RowBatch>> {
        self.lock()?
            .get(name)
            .cloned()
            .ok_or_else(|| IoError::NotFound(name.to_string()))
    }
}

impl DatasetSource for MemorySource {
    fn open(&self, name: &str) -> Result<DatasetInfo> {
        let batch = self.get(name)?;
        Ok(DatasetInfo {
            schema: infer_schema(&batch),
            rows: batch.num_rows() as u64,
        })
    }

    fn read_range(&self, name: &str, range: Range<u64>, columns: &[String]) -> Result<RowBatch> {
        let batch = self.get(name)?;
        let rows = batch.num_rows() as u64;
        if range.end > rows || range.start > range.end {
            return Err(IoError::Format(format!(
                "dataset '{}': range {}..{} outside {} rows",
                name, range.start, range.end, rows
            )));
        }
        batch
            .slice(range.start as usize..range.end as usize, columns)
            .map_err(IoError::Format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evgraph_core::schema::DataType;
    use evgraph_core::types::{Column, Scalar};

    fn events() -> RowBatch {
        RowBatch::new(vec![
            Column::new("x", (0..10).map(Scalar::I64).collect()),
            Column::new(
                "pt",
                (0..10).map(|i| Scalar::F64Vec(vec![i as f64; i % 3])).collect(),
            ),
        ])
    }

    #[test]
    fn open_reports_schema_and_rows() {
        let src = MemorySource::new();
        src.insert("events", events()).unwrap();
        let info = src.open("events").unwrap();
        assert_eq!(info.rows, 10);
        assert_eq!(info.schema.field_named("pt").unwrap().data_type, DataType::Float64Vec);
        assert!(matches!(src.open("nope"), Err(IoError::NotFound(_))));
    }

    #[test]
    fn read_range_slices_rows_and_columns() {
        let src = MemorySource::new();
        src.insert("events", events()).unwrap();
        let b = src.read_range("events", 3..6, &["x".to_string()]).unwrap();
        assert_eq!(b.num_rows(), 3);
        assert_eq!(b.columns[0].values[0], Scalar::I64(3));
        assert!(src.read_range("events", 8..11, &[]).is_err());
    }

    #[test]
    fn insert_rejects_ragged_or_mixed_columns() {
        let src = MemorySource::new();
        let ragged = RowBatch::new(vec![
            Column::new("a", vec![Scalar::I64(1)]),
            Column::new("b", vec![]),
        ]);
        assert!(src.insert("r", ragged).is_err());
        let mixed = RowBatch::new(vec![Column::new("a", vec![Scalar::I64(1), Scalar::F64(1.0)])]);
        assert!(src.insert("m", mixed).is_err());
        assert!(src.is_empty());
    }
}
