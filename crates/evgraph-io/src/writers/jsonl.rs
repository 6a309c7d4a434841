//! Streaming NDJSON writer with a configurable flush cadence.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};

use crate::error::{IoError, Result};
use evgraph_core::types::{RowBatch, Scalar};

pub struct JsonlWriter<W: Write> {
    writer: BufWriter<W>,
    // header order to keep column ordering stable across batches
    columns: Vec<String>,
    /// Flush every `auto_flush` rows; 0 flushes only on `finish`.
    auto_flush: usize,
    pending: usize,
    rows: u64,
    flushes: u64,
}

impl JsonlWriter<File> {
    pub fn to_path(path: &std::path::Path, columns: Vec<String>, auto_flush: usize) -> Result<Self> {
        let f = File::create(path)?;
        Ok(Self::to_writer(f, columns, auto_flush))
    }
}

impl<W: Write> JsonlWriter<W> {
    pub fn to_writer(writer: W, columns: Vec<String>, auto_flush: usize) -> Self {
        Self {
            writer: BufWriter::new(writer),
            columns,
            auto_flush,
            pending: 0,
            rows: 0,
            flushes: 0,
        }
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn flushes(&self) -> u64 {
        self.flushes
    }

    /// Write a batch as one JSON object per line.
    /// If `columns` was empty, infer it from the first batch.
    pub fn write_batch(&mut self, batch: &RowBatch) -> Result<()> {
        if self.columns.is_empty() {
            self.columns = batch.column_names();
        }
        let cols = self
            .columns
            .iter()
            .map(|name| {
                batch
                    .column(name)
                    .ok_or_else(|| IoError::Format(format!("batch has no column '{}'", name)))
            })
            .collect::<Result<Vec<_>>>()?;
        for r in 0..batch.num_rows() {
            let mut obj = BTreeMap::new();
            for col in &cols {
                obj.insert(col.name.as_str(), scalar_to_json(&col.values[r]));
            }
            let line = serde_json::to_string(&obj)?;
            writeln!(self.writer, "{}", line)?;
            self.rows += 1;
            self.pending += 1;
            if self.auto_flush > 0 && self.pending >= self.auto_flush {
                self.flush()?;
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.pending = 0;
        self.flushes += 1;
        Ok(())
    }

    /// Flush rows still buffered. Always flushes at least once per writer.
    pub fn finish(&mut self) -> Result<()> {
        if self.pending > 0 || self.flushes == 0 {
            self.flush()?;
        }
        Ok(())
    }

    pub fn into_inner(mut self) -> Result<W> {
        self.finish()?;
        self.writer
            .into_inner()
            .map_err(|e| IoError::Io(e.into_error()))
    }
}

pub fn scalar_to_json(v: &Scalar) -> serde_json::Value {
    use serde_json::Value;
    let num = |f: f64| serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null);
    match v {
        Scalar::Null => Value::Null,
        Scalar::Bool(b) => Value::Bool(*b),
        Scalar::I64(i) => Value::from(*i),
        Scalar::F64(f) => num(*f),
        Scalar::Str(s) => Value::String(s.clone()),
        Scalar::BoolVec(v) => Value::Array(v.iter().map(|b| Value::Bool(*b)).collect()),
        Scalar::I64Vec(v) => Value::Array(v.iter().map(|i| Value::from(*i)).collect()),
        Scalar::F64Vec(v) => Value::Array(v.iter().map(|f| num(*f)).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evgraph_core::types::Column;

    fn batch(n: i64) -> RowBatch {
        RowBatch::new(vec![
            Column::new("x", (0..n).map(Scalar::I64).collect()),
            Column::new("v", (0..n).map(|i| Scalar::F64Vec(vec![i as f64])).collect()),
        ])
    }

    #[test]
    fn cadence_changes_flushes_not_content() {
        let mut eager = JsonlWriter::to_writer(Vec::new(), vec!["x".into(), "v".into()], 2);
        eager.write_batch(&batch(5)).unwrap();
        assert_eq!(eager.flushes(), 2);
        eager.finish().unwrap();
        assert_eq!(eager.flushes(), 3);
        let eager_bytes = eager.into_inner().unwrap();

        let mut lazy = JsonlWriter::to_writer(Vec::new(), vec!["x".into(), "v".into()], 0);
        lazy.write_batch(&batch(5)).unwrap();
        assert_eq!(lazy.flushes(), 0);
        let lazy_bytes = lazy.into_inner().unwrap();

        assert_eq!(eager_bytes, lazy_bytes);
        let text = String::from_utf8(lazy_bytes).unwrap();
        assert_eq!(text.lines().count(), 5);
        assert_eq!(text.lines().next().unwrap(), r#"{"v":[0.0],"x":0}"#);
    }

    #[test]
    fn unknown_column_is_rejected() {
        let mut w = JsonlWriter::to_writer(Vec::new(), vec!["nope".into()], 0);
        assert!(w.write_batch(&batch(1)).is_err());
    }
}
