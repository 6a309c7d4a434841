//! Terminal action declarations.

use serde::{Deserialize, Serialize};

/// Binning and labels for a one-dimensional histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoModel {
    pub name: String,
    #[serde(default)]
    pub title: String,
    pub nbins: usize,
    pub low: f64,
    pub high: f64,
}

impl HistoModel {
    pub fn new(name: impl Into<String>, nbins: usize, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            title: String::new(),
            nbins,
            low,
            high,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

/// Export options for snapshot actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotOptions {
    /// Flush the writer every `auto_flush` rows; 0 flushes once at the end.
    /// Bounds only the serialized output held between flushes: selected rows
    /// are collected in memory before the sink runs. Never changes content.
    #[serde(default)]
    pub auto_flush: usize,
    /// When false the snapshot triggers as soon as it is declared.
    #[serde(default)]
    pub lazy: bool,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            auto_flush: 0,
            lazy: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Number of selected entries.
    Count,
    /// Sum of a numeric column (vector columns sum their elements).
    Sum { column: String },
    Histo1D {
        model: HistoModel,
        column: String,
        weight: Option<String>,
    },
    /// Write selected rows to an external sink.
    Snapshot {
        output: String,
        columns: Vec<String>,
        options: SnapshotOptions,
    },
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Count => "count",
            ActionKind::Sum { .. } => "sum",
            ActionKind::Histo1D { .. } => "histo1d",
            ActionKind::Snapshot { .. } => "snapshot",
        }
    }

    /// Columns read by the action, in the order they are filled.
    pub fn input_columns(&self) -> Vec<String> {
        match self {
            ActionKind::Count => vec![],
            ActionKind::Sum { column } => vec![column.clone()],
            ActionKind::Histo1D { column, weight, .. } => {
                let mut v = vec![column.clone()];
                if let Some(w) = weight {
                    v.push(w.clone());
                }
                v
            }
            ActionKind::Snapshot { columns, .. } => columns.clone(),
        }
    }
}
