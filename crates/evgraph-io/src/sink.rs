//! Snapshot export collaborator.
//!
//! A sink receives the merged, selected rows of one snapshot action as a
//! single in-memory batch and writes them under an output name. The flush
//! cadence changes how often the writer pushes serialized rows to the
//! underlying file, never what is written and not how many rows are held.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use evgraph_core::action::SnapshotOptions;
use evgraph_core::types::RowBatch;

use crate::error::{IoError, Result};
use crate::writers::jsonl::JsonlWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteStats {
    pub rows: u64,
    pub flushes: u64,
}

pub trait SnapshotSink: Send + Sync {
    fn write(
        &self,
        output: &str,
        columns: &[String],
        rows: &RowBatch,
        options: &SnapshotOptions,
    ) -> Result<WriteStats>;
}

/// Writes `<dir>/<output>` as JSON lines, creating directories as needed.
#[derive(Debug, Clone)]
pub struct FsSink {
    dir: PathBuf,
}

impl FsSink {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_of(&self, output: &str) -> PathBuf {
        self.dir.join(output)
    }
}

impl SnapshotSink for FsSink {
    fn write(
        &self,
        output: &str,
        columns: &[String],
        rows: &RowBatch,
        options: &SnapshotOptions,
    ) -> Result<WriteStats> {
        let path = self.path_of(output);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut w = JsonlWriter::to_path(&path, columns.to_vec(), options.auto_flush)?;
        w.write_batch(rows)?;
        w.finish()?;
        Ok(WriteStats {
            rows: w.rows(),
            flushes: w.flushes(),
        })
    }
}

/// What a `MemorySink` recorded for one output.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemoryOutput {
    pub bytes: Vec<u8>,
    pub stats: WriteStats,
}

impl MemoryOutput {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// In-memory sink for tests; cloning shares the recorded outputs.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    outputs: Arc<Mutex<HashMap<String, MemoryOutput>>>,
    fail_on: Arc<Mutex<Option<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make writes to `output` fail, to exercise I/O failure paths.
    pub fn fail_on(&self, output: &str) {
        if let Ok(mut f) = self.fail_on.lock() {
            *f = Some(output.to_string());
        }
    }

    pub fn get(&self, output: &str) -> Option<MemoryOutput> {
        self.outputs.lock().ok()?.get(output).cloned()
    }

    pub fn len(&self) -> usize {
        self.outputs.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnapshotSink for MemorySink {
    fn write(
        &self,
        output: &str,
        columns: &[String],
        rows: &RowBatch,
        options: &SnapshotOptions,
    ) -> Result<WriteStats> {
        let failing = self
            .fail_on
            .lock()
            .map_err(|_| IoError::Format("memory sink lock poisoned".into()))?
            .as_deref()
            == Some(output);
        if failing {
            return Err(IoError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("refusing to write '{}'", output),
            )));
        }
        let mut w = JsonlWriter::to_writer(Vec::new(), columns.to_vec(), options.auto_flush);
        w.write_batch(rows)?;
        w.finish()?;
        let stats = WriteStats {
            rows: w.rows(),
            flushes: w.flushes(),
        };
        let bytes = w.into_inner()?;
        self.outputs
            .lock()
            .map_err(|_| IoError::Format("memory sink lock poisoned".into()))?
            .insert(output.to_string(), MemoryOutput { bytes, stats });
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evgraph_core::types::{Column, Scalar};

    fn rows(n: i64) -> RowBatch {
        RowBatch::new(vec![Column::new("x", (0..n).map(Scalar::I64).collect())])
    }

    #[test]
    fn memory_sink_records_output_and_cadence() {
        let sink = MemorySink::new();
        let opts = SnapshotOptions {
            auto_flush: 3,
            lazy: false,
        };
        let stats = sink.write("a.jsonl", &["x".into()], &rows(7), &opts).unwrap();
        assert_eq!(stats, WriteStats { rows: 7, flushes: 3 });
        let out = sink.get("a.jsonl").unwrap();
        assert_eq!(out.text().lines().count(), 7);

        sink.fail_on("b.jsonl");
        assert!(sink.write("b.jsonl", &["x".into()], &rows(1), &opts).is_err());
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn fs_sink_writes_under_dir() {
        let dir = std::env::temp_dir().join(format!("evgraph-sink-{}", std::process::id()));
        let sink = FsSink::new(&dir);
        let stats = sink
            .write("sub/out.jsonl", &["x".into()], &rows(2), &SnapshotOptions::default())
            .unwrap();
        assert_eq!(stats.rows, 2);
        let text = fs::read_to_string(sink.path_of("sub/out.jsonl")).unwrap();
        assert_eq!(text, "{\"x\":0}\n{\"x\":1}\n");
        fs::remove_dir_all(&dir).unwrap();
    }
}
