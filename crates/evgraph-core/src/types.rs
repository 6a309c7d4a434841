//! Lightweight value/column representations.
//!
//! Rows are read from the dataset collaborator as `RowBatch`es and evaluated
//! row by row inside a partition pass. Columns hold either per-event scalars
//! or per-event variable-length vectors.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::schema::DataType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Str(String),
    BoolVec(Vec<bool>),
    I64Vec(Vec<i64>),
    F64Vec(Vec<f64>),
}

impl Scalar {
    /// Runtime type; `None` for nulls.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(_) => Some(DataType::Boolean),
            Scalar::I64(_) => Some(DataType::Int64),
            Scalar::F64(_) => Some(DataType::Float64),
            Scalar::Str(_) => Some(DataType::Utf8),
            Scalar::BoolVec(_) => Some(DataType::BooleanVec),
            Scalar::I64Vec(_) => Some(DataType::Int64Vec),
            Scalar::F64Vec(_) => Some(DataType::Float64Vec),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Numeric view of a scalar value (booleans are 0/1).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Scalar::I64(i) => Some(*i as f64),
            Scalar::F64(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view of a vector value.
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            Scalar::BoolVec(v) => Some(v.iter().map(|b| if *b { 1.0 } else { 0.0 }).collect()),
            Scalar::I64Vec(v) => Some(v.iter().map(|i| *i as f64).collect()),
            Scalar::F64Vec(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// Length of a vector value; `None` for scalars.
    pub fn vec_len(&self) -> Option<usize> {
        match self {
            Scalar::BoolVec(v) => Some(v.len()),
            Scalar::I64Vec(v) => Some(v.len()),
            Scalar::F64Vec(v) => Some(v.len()),
            _ => None,
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::I64(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::F64(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Str(v.to_string())
    }
}

impl From<Vec<f64>> for Scalar {
    fn from(v: Vec<f64>) -> Self {
        Scalar::F64Vec(v)
    }
}

impl From<Vec<i64>> for Scalar {
    fn from(v: Vec<i64>) -> Self {
        Scalar::I64Vec(v)
    }
}

impl From<Vec<bool>> for Scalar {
    fn from(v: Vec<bool>) -> Self {
        Scalar::BoolVec(v)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Scalar>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Scalar>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Column-major batch of rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowBatch {
    pub columns: Vec<Column>,
}

impl RowBatch {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Copy of rows `range` restricted to `names` (all columns when empty).
    pub fn slice(&self, range: Range<usize>, names: &[String]) -> Result<RowBatch, String> {
        let end = range.end.min(self.num_rows());
        let start = range.start.min(end);
        let pick = |c: &Column| Column {
            name: c.name.clone(),
            values: c.values[start..end].to_vec(),
        };
        if names.is_empty() {
            return Ok(RowBatch {
                columns: self.columns.iter().map(pick).collect(),
            });
        }
        let columns = names
            .iter()
            .map(|n| {
                self.column(n)
                    .map(pick)
                    .ok_or_else(|| format!("column '{}' not found", n))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RowBatch { columns })
    }

    /// Append the rows of `other` (same column names, same order).
    ///
    /// Appending to an empty batch adopts `other`'s layout.
    pub fn append(&mut self, other: RowBatch) -> Result<(), String> {
        if self.columns.is_empty() {
            self.columns = other.columns;
            return Ok(());
        }
        if other.columns.is_empty() {
            return Ok(());
        }
        if self.column_names() != other.column_names() {
            return Err(format!(
                "cannot append batches with different columns: {:?} vs {:?}",
                self.column_names(),
                other.column_names()
            ));
        }
        for (mine, theirs) in self.columns.iter_mut().zip(other.columns) {
            mine.values.extend(theirs.values);
        }
        Ok(())
    }

    /// Add one row given as values aligned with `names`.
    pub fn push_row(&mut self, names: &[String], row: Vec<Scalar>) -> Result<(), String> {
        if self.columns.is_empty() {
            self.columns = names.iter().map(|n| Column::new(n.clone(), vec![])).collect();
        }
        if row.len() != self.columns.len() {
            return Err(format!(
                "row has {} values for {} columns",
                row.len(),
                self.columns.len()
            ));
        }
        for (col, v) in self.columns.iter_mut().zip(row) {
            col.values.push(v);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> RowBatch {
        RowBatch::new(vec![
            Column::new("x", vec![Scalar::I64(1), Scalar::I64(2), Scalar::I64(3)]),
            Column::new(
                "v",
                vec![
                    Scalar::F64Vec(vec![1.0]),
                    Scalar::F64Vec(vec![]),
                    Scalar::F64Vec(vec![2.0, 3.0]),
                ],
            ),
        ])
    }

    #[test]
    fn slice_picks_rows_and_columns() {
        let b = batch().slice(1..3, &["v".to_string()]).unwrap();
        assert_eq!(b.num_rows(), 2);
        assert_eq!(b.column_names(), vec!["v".to_string()]);
        assert_eq!(b.columns[0].values[1], Scalar::F64Vec(vec![2.0, 3.0]));
    }

    #[test]
    fn slice_unknown_column_fails() {
        assert!(batch().slice(0..1, &["nope".to_string()]).is_err());
    }

    #[test]
    fn append_requires_same_layout() {
        let mut a = batch();
        a.append(batch()).unwrap();
        assert_eq!(a.num_rows(), 6);

        let other = RowBatch::new(vec![Column::new("y", vec![Scalar::I64(0)])]);
        assert!(a.append(other).is_err());
    }

    #[test]
    fn vector_views() {
        assert_eq!(Scalar::BoolVec(vec![true, false]).to_f64_vec(), Some(vec![1.0, 0.0]));
        assert_eq!(Scalar::I64Vec(vec![4, 5]).vec_len(), Some(2));
        assert_eq!(Scalar::F64(1.0).vec_len(), None);
        assert_eq!(Scalar::Bool(true).as_f64(), Some(1.0));
    }
}
