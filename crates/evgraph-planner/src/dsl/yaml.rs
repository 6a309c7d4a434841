//! YAML analysis files: dataset, linear steps, and actions.
//!
//! Example:
//! ```yaml
//! config: { npartitions: 4 }
//! dataset:
//!   samples:
//!     - { name: signal, source: events, entries: [0, 100] }
//!   global_range: [0, 100]
//! steps:
//!   - { op: define, name: x2, expr: "x * 2" }
//!   - { op: filter, expr: "x > 25", name: above }
//!   - { op: vary, column: w, exprs: ["w * 0.9", "w * 1.1"], tags: [down, up] }
//! actions:
//!   - { op: histo1d, name: hx, column: x, nbins: 25, low: 50, high: 550, weight: w, variations: true }
//!   - { op: count, name: selected }
//!   - { op: snapshot, output: picked.jsonl, columns: [x, _entry], auto_flush: 10 }
//! ```

use serde::{Deserialize, Serialize};

use evgraph_core::action::{ActionKind, HistoModel, SnapshotOptions};
use evgraph_core::config::EngineConfig;
use evgraph_core::error::{Error, Result};
use evgraph_core::expr::Expr;
use evgraph_core::spec::{DatasetSpec, Sample};
use evgraph_operators::parse_expr;

use crate::partition::PartitionPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisDoc {
    #[serde(default)]
    pub config: Option<AnalysisConfig>,
    pub dataset: DatasetDoc,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub actions: Vec<ActionDoc>,
}

/// Per-analysis overrides of `EngineConfig`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub npartitions: Option<usize>,
    pub max_parallel_tasks: Option<usize>,
    pub output_dir: Option<String>,
    pub data_dir: Option<String>,
    pub seed: Option<u64>,
}

impl AnalysisConfig {
    pub fn apply(&self, cfg: &mut EngineConfig) {
        if let Some(n) = self.npartitions {
            cfg.npartitions = n;
        }
        if let Some(n) = self.max_parallel_tasks {
            cfg.max_parallel_tasks = n;
        }
        if let Some(d) = &self.output_dir {
            cfg.output_dir = d.clone();
        }
        if let Some(d) = &self.data_dir {
            cfg.data_dir = d.clone();
        }
        if let Some(s) = self.seed {
            cfg.seed = Some(s);
        }
    }
}

/// `[start, end)` written as a two-element list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeDoc(pub u64, pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleDoc {
    #[serde(default)]
    pub name: Option<String>,
    /// Dataset name served by the source.
    #[serde(default)]
    pub source: Option<String>,
    /// Column-less sample of this many entries.
    #[serde(default)]
    pub empty: Option<u64>,
    #[serde(default)]
    pub entries: Option<RangeDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetDoc {
    pub samples: Vec<SampleDoc>,
    #[serde(default)]
    pub global_range: Option<RangeDoc>,
    /// Explicit partition ranges; count-based from config otherwise.
    #[serde(default)]
    pub partitions: Option<Vec<RangeDoc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "op")]
pub enum Step {
    #[serde(rename = "define")]
    Define { name: String, expr: String },

    #[serde(rename = "filter")]
    Filter {
        expr: String,
        #[serde(default)]
        name: Option<String>,
    },

    #[serde(rename = "vary")]
    Vary {
        column: String,
        exprs: Vec<String>,
        tags: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "op")]
pub enum ActionDoc {
    #[serde(rename = "count")]
    Count {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        variations: bool,
    },

    #[serde(rename = "sum")]
    Sum {
        column: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        variations: bool,
    },

    #[serde(rename = "histo1d")]
    Histo1D {
        name: String,
        #[serde(default)]
        title: String,
        column: String,
        nbins: usize,
        low: f64,
        high: f64,
        #[serde(default)]
        weight: Option<String>,
        #[serde(default)]
        variations: bool,
    },

    #[serde(rename = "snapshot")]
    Snapshot {
        output: String,
        #[serde(default)]
        columns: Vec<String>,
        #[serde(default)]
        auto_flush: usize,
        #[serde(default)]
        lazy: bool,
    },
}

/// A step with its expressions parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphStep {
    Define { name: String, expr: Expr },
    Filter { predicate: Expr, name: Option<String> },
    Vary {
        column: String,
        alternatives: Vec<Expr>,
        tags: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionDecl {
    /// Output key for the result.
    pub name: String,
    pub kind: ActionKind,
    pub variations: bool,
}

#[derive(Debug, Clone)]
pub struct ParsedAnalysis {
    pub config: AnalysisConfig,
    pub dataset: DatasetSpec,
    pub partitions: Option<PartitionPolicy>,
    pub steps: Vec<GraphStep>,
    pub actions: Vec<ActionDecl>,
}

fn yaml_err(e: serde_yaml::Error) -> Error {
    Error::Plan(format!("invalid analysis YAML: {}", e))
}

fn parse_sample(i: usize, s: SampleDoc) -> Result<Sample> {
    let sample = match (s.source, s.empty) {
        (Some(src), None) => {
            let name = s.name.unwrap_or_else(|| src.clone());
            Sample::new(name, src)
        }
        (None, Some(rows)) => {
            let mut sample = Sample::empty(rows);
            sample.name = s.name.unwrap_or_else(|| format!("empty{}", i));
            sample
        }
        _ => {
            return Err(Error::Plan(format!(
                "sample {} needs exactly one of 'source' or 'empty'",
                i
            )))
        }
    };
    Ok(match s.entries {
        Some(RangeDoc(a, b)) => sample.with_entries(a..b),
        None => sample,
    })
}

/// Parse an analysis document and all of its expressions.
pub fn parse_yaml_analysis(src: &str) -> Result<ParsedAnalysis> {
    let doc: AnalysisDoc = serde_yaml::from_str(src).map_err(yaml_err)?;

    let mut dataset = DatasetSpec::new();
    for (i, s) in doc.dataset.samples.into_iter().enumerate() {
        dataset = dataset.add_sample(parse_sample(i, s)?);
    }
    if let Some(RangeDoc(a, b)) = doc.dataset.global_range {
        dataset = dataset.with_global_range(a..b);
    }
    dataset.validate()?;
    let partitions = doc
        .dataset
        .partitions
        .map(|rs| PartitionPolicy::Explicit(rs.into_iter().map(|RangeDoc(a, b)| a..b).collect()));

    let steps = doc
        .steps
        .into_iter()
        .map(|step| {
            Ok(match step {
                Step::Define { name, expr } => GraphStep::Define {
                    name,
                    expr: parse_expr(&expr)?,
                },
                Step::Filter { expr, name } => GraphStep::Filter {
                    predicate: parse_expr(&expr)?,
                    name,
                },
                Step::Vary {
                    column,
                    exprs,
                    tags,
                } => GraphStep::Vary {
                    column,
                    alternatives: exprs
                        .iter()
                        .map(|e| parse_expr(e))
                        .collect::<Result<Vec<_>>>()?,
                    tags,
                },
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let actions = doc
        .actions
        .into_iter()
        .enumerate()
        .map(|(i, a)| match a {
            ActionDoc::Count { name, variations } => ActionDecl {
                name: name.unwrap_or_else(|| format!("count{}", i)),
                kind: ActionKind::Count,
                variations,
            },
            ActionDoc::Sum {
                column,
                name,
                variations,
            } => ActionDecl {
                name: name.unwrap_or_else(|| format!("sum_{}", column)),
                kind: ActionKind::Sum { column },
                variations,
            },
            ActionDoc::Histo1D {
                name,
                title,
                column,
                nbins,
                low,
                high,
                weight,
                variations,
            } => ActionDecl {
                name: name.clone(),
                kind: ActionKind::Histo1D {
                    model: HistoModel::new(name, nbins, low, high).with_title(title),
                    column,
                    weight,
                },
                variations,
            },
            ActionDoc::Snapshot {
                output,
                columns,
                auto_flush,
                lazy,
            } => ActionDecl {
                name: output.clone(),
                kind: ActionKind::Snapshot {
                    output,
                    columns,
                    options: SnapshotOptions { auto_flush, lazy },
                },
                variations: false,
            },
        })
        .collect();

    Ok(ParsedAnalysis {
        config: doc.config.unwrap_or_default(),
        dataset,
        partitions,
        steps,
        actions,
    })
}
