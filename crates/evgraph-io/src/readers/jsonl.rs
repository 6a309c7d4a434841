//! JSON-lines dataset source: `<root>/<name>.jsonl`, one object per entry.
//!
//! Value mapping: integers become `Int64`, other numbers `Float64`, arrays
//! of numbers become vectors (`Int64Vec` when every element is an integer),
//! arrays of booleans `BooleanVec`. A column mixing integers and floats is
//! widened to floats. Missing keys are nulls. Files are parsed once and
//! cached.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use evgraph_core::schema::DataType;
use evgraph_core::types::{Column, RowBatch, Scalar};

use crate::error::{IoError, Result};
use crate::source::{infer_schema, DatasetInfo, DatasetSource};

pub struct JsonlSource {
    root: PathBuf,
    cache: Mutex<HashMap<String, Arc<RowBatch>>>,
}

impl JsonlSource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.jsonl", name))
    }

    fn load(&self, name: &str) -> Result<Arc<RowBatch>> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| IoError::Format("jsonl cache lock poisoned".into()))?;
        if let Some(b) = cache.get(name) {
            return Ok(b.clone());
        }
        let path = self.path_of(name);
        if !path.exists() {
            return Err(IoError::NotFound(path.display().to_string()));
        }
        let text = fs::read_to_string(&path)?;
        let batch = Arc::new(parse_jsonl(&text)?);
        cache.insert(name.to_string(), batch.clone());
        Ok(batch)
    }
}

fn json_to_scalar(v: &serde_json::Value) -> Result<Scalar> {
    use serde_json::Value;
    Ok(match v {
        Value::Null => Scalar::Null,
        Value::Bool(b) => Scalar::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Scalar::I64(i),
            None => Scalar::F64(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => Scalar::Str(s.clone()),
        Value::Array(items) => {
            if items.iter().all(Value::is_boolean) && !items.is_empty() {
                Scalar::BoolVec(items.iter().filter_map(Value::as_bool).collect())
            } else if items.iter().all(|x| x.is_i64()) {
                Scalar::I64Vec(items.iter().filter_map(Value::as_i64).collect())
            } else if items.iter().all(Value::is_number) {
                Scalar::F64Vec(items.iter().filter_map(Value::as_f64).collect())
            } else {
                return Err(IoError::Format(format!("unsupported array {}", v)));
            }
        }
        Value::Object(_) => return Err(IoError::Format(format!("nested object {}", v))),
    })
}

fn widen(v: Scalar) -> Scalar {
    match v {
        Scalar::I64(i) => Scalar::F64(i as f64),
        Scalar::I64Vec(xs) => Scalar::F64Vec(xs.into_iter().map(|i| i as f64).collect()),
        other => other,
    }
}

/// Parse JSON lines into a column-major batch.
pub fn parse_jsonl(text: &str) -> Result<RowBatch> {
    let mut columns: BTreeMap<String, Vec<Scalar>> = BTreeMap::new();
    let mut rows = 0usize;
    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let obj: serde_json::Map<String, serde_json::Value> = serde_json::from_str(line)
            .map_err(|e| IoError::Format(format!("line {}: {}", lineno + 1, e)))?;
        for (k, v) in &obj {
            let col = columns
                .entry(k.clone())
                .or_insert_with(|| vec![Scalar::Null; rows]);
            col.push(json_to_scalar(v)?);
        }
        rows += 1;
        for col in columns.values_mut() {
            if col.len() < rows {
                col.push(Scalar::Null);
            }
        }
    }

    let mut out = Vec::with_capacity(columns.len());
    for (name, mut values) in columns {
        let has = |t: DataType| values.iter().any(|v| v.data_type() == Some(t));
        if (has(DataType::Int64) && has(DataType::Float64))
            || (has(DataType::Int64Vec) && has(DataType::Float64Vec))
        {
            values = values.into_iter().map(widen).collect();
        }
        let mut types = values.iter().filter_map(Scalar::data_type);
        if let Some(first) = types.next() {
            if types.any(|t| t != first) {
                return Err(IoError::Format(format!("column '{}' mixes value types", name)));
            }
        }
        out.push(Column::new(name, values));
    }
    Ok(RowBatch::new(out))
}

impl DatasetSource for JsonlSource {
    fn open(&self, name: &str) -> Result<DatasetInfo> {
        let batch = self.load(name)?;
        Ok(DatasetInfo {
            schema: infer_schema(&batch),
            rows: batch.num_rows() as u64,
        })
    }

    fn read_range(&self, name: &str, range: Range<u64>, columns: &[String]) -> Result<RowBatch> {
        let batch = self.load(name)?;
        if range.end > batch.num_rows() as u64 || range.start > range.end {
            return Err(IoError::Format(format!(
                "dataset '{}': range {}..{} outside {} rows",
                name,
                range.start,
                range.end,
                batch.num_rows()
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

    #[test]
    fn widens_and_fills_missing_keys() {
        let text = r#"{"x": 1, "pt": [1, 2]}
{"x": 2.5, "pt": [0.5], "flag": true}

{"x": 3, "pt": []}
"#;
        let b = parse_jsonl(text).unwrap();
        assert_eq!(b.num_rows(), 3);
        assert_eq!(b.column_names(), vec!["flag", "pt", "x"]);
        let x = b.column("x").unwrap();
        assert_eq!(x.values, vec![Scalar::F64(1.0), Scalar::F64(2.5), Scalar::F64(3.0)]);
        let flag = b.column("flag").unwrap();
        assert_eq!(flag.values, vec![Scalar::Null, Scalar::Bool(true), Scalar::Null]);
        let pt = b.column("pt").unwrap();
        assert_eq!(pt.values[0], Scalar::F64Vec(vec![1.0, 2.0]));
    }

    #[test]
    fn source_reads_from_root_dir() {
        let dir = std::env::temp_dir().join(format!("evgraph-jsonl-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("events.jsonl"), "{\"x\": 1}\n{\"x\": 2}\n{\"x\": 3}\n").unwrap();

        let src = JsonlSource::new(&dir);
        let info = src.open("events").unwrap();
        assert_eq!(info.rows, 3);
        assert_eq!(info.schema.field_named("x").unwrap().data_type, DataType::Int64);
        let b = src.read_range("events", 1..3, &[]).unwrap();
        assert_eq!(b.columns[0].values, vec![Scalar::I64(2), Scalar::I64(3)]);
        assert!(matches!(src.open("missing"), Err(IoError::NotFound(_))));

        fs::remove_dir_all(&dir).unwrap();
    }
}
