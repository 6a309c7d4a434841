//! Dataset specifications and their version tokens.
//!
//! A `DatasetSpec` concatenates one or more samples into a single logical
//! row space `[0, N)` and may restrict it with a global range. Specs are never
//! mutated once bound: a respec produces a new `VersionedSpec` with the next
//! version number, so results computed against version N stay attributable.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleSource {
    /// A named dataset served by the source collaborator.
    Named(String),
    /// `rows` entries without any columns.
    Empty { rows: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub name: String,
    pub source: SampleSource,
    /// Physical entry range inside the source; the whole source when `None`.
    #[serde(default)]
    pub entries: Option<Range<u64>>,
}

impl Sample {
    pub fn new(name: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: SampleSource::Named(dataset.into()),
            entries: None,
        }
    }

    pub fn empty(rows: u64) -> Self {
        Self {
            name: String::new(),
            source: SampleSource::Empty { rows },
            entries: None,
        }
    }

    pub fn with_entries(mut self, entries: Range<u64>) -> Self {
        self.entries = Some(entries);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub samples: Vec<Sample>,
    /// Restriction of the logical row space; the whole space when `None`.
    #[serde(default)]
    pub global_range: Option<Range<u64>>,
}

impl DatasetSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spec with a single named sample.
    pub fn single(dataset: impl Into<String>) -> Self {
        let dataset = dataset.into();
        Self::new().add_sample(Sample::new(dataset.clone(), dataset))
    }

    /// Spec of `rows` column-less entries.
    pub fn empty(rows: u64) -> Self {
        Self::new().add_sample(Sample::empty(rows))
    }

    pub fn add_sample(mut self, sample: Sample) -> Self {
        self.samples.push(sample);
        self
    }

    pub fn with_global_range(mut self, range: Range<u64>) -> Self {
        self.global_range = Some(range);
        self
    }

    /// Structural checks that need no data access.
    pub fn validate(&self) -> Result<()> {
        if self.samples.is_empty() {
            return Err(Error::Config("dataset spec has no samples".into()));
        }
        for s in &self.samples {
            if let Some(r) = &s.entries {
                if r.start >= r.end {
                    return Err(Error::EmptyRange(format!(
                        "sample '{}' entries {}..{}",
                        s.name, r.start, r.end
                    )));
                }
            }
        }
        if let Some(r) = &self.global_range {
            if r.start >= r.end {
                return Err(Error::EmptyRange(format!(
                    "global range {}..{}",
                    r.start, r.end
                )));
            }
        }
        Ok(())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SpecVersion(pub u64);

impl SpecVersion {
    pub fn next(self) -> Self {
        SpecVersion(self.0 + 1)
    }
}

impl fmt::Display for SpecVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A spec value pinned to a version token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedSpec {
    pub version: SpecVersion,
    pub spec: DatasetSpec,
}

impl VersionedSpec {
    pub fn initial(spec: DatasetSpec) -> Self {
        Self {
            version: SpecVersion(0),
            spec,
        }
    }

    /// Successor carrying `spec`; `self` is left untouched.
    pub fn succeed(&self, spec: DatasetSpec) -> Self {
        Self {
            version: self.version.next(),
            spec,
        }
    }
}
