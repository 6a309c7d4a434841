//! Logical schema types. Pure data.
//!
//! Event data mixes per-event scalars with variable-length vectors
//! (one entry per jet, lepton, ...), so vector types are first-class here.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int64,
    Float64,
    Utf8,
    BooleanVec,
    Int64Vec,
    Float64Vec,
}

impl DataType {
    pub fn is_vector(self) -> bool {
        matches!(
            self,
            DataType::BooleanVec | DataType::Int64Vec | DataType::Float64Vec
        )
    }

    /// Numeric scalar (booleans count as 0/1, as they do in masks).
    pub fn is_numeric(self) -> bool {
        matches!(self, DataType::Boolean | DataType::Int64 | DataType::Float64)
    }

    /// Element type of a vector, or the type itself for scalars.
    pub fn element(self) -> DataType {
        match self {
            DataType::BooleanVec => DataType::Boolean,
            DataType::Int64Vec => DataType::Int64,
            DataType::Float64Vec => DataType::Float64,
            other => other,
        }
    }

    /// Vector type holding elements of `self`; `None` for strings.
    pub fn vector_of(self) -> Option<DataType> {
        match self {
            DataType::Boolean | DataType::BooleanVec => Some(DataType::BooleanVec),
            DataType::Int64 | DataType::Int64Vec => Some(DataType::Int64Vec),
            DataType::Float64 | DataType::Float64Vec => Some(DataType::Float64Vec),
            DataType::Utf8 => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::Boolean => "bool",
            DataType::Int64 => "i64",
            DataType::Float64 => "f64",
            DataType::Utf8 => "str",
            DataType::BooleanVec => "vec<bool>",
            DataType::Int64Vec => "vec<i64>",
            DataType::Float64Vec => "vec<f64>",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn empty() -> Self {
        Self { fields: vec![] }
    }

    pub fn field(&self, idx: usize) -> Option<&Field> {
        self.fields.get(idx)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field_named(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }
}
