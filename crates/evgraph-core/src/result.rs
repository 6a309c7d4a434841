//! Action results and their merge algebra.
//!
//! Every partition produces a partial `VariantResult` per action; the
//! scheduler folds them together with `merge`. Counts, sums and histograms
//! merge associatively and commutatively. Row collections (snapshots) merge
//! by concatenation, which the scheduler keeps deterministic by always
//! folding in partition order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::histogram::Histogram1D;
use crate::types::RowBatch;

/// Reserved tag of the unvaried result.
pub const NOMINAL: &str = "nominal";

/// What a snapshot wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub output: String,
    pub columns: Vec<String>,
    pub rows: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionResult {
    Count(u64),
    Sum(f64),
    Histogram(Histogram1D),
    /// Partial snapshot rows, before they are written out.
    Rows(RowBatch),
    Snapshot(SnapshotSummary),
}

impl ActionResult {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ActionResult::Count(_) => "count",
            ActionResult::Sum(_) => "sum",
            ActionResult::Histogram(_) => "histogram",
            ActionResult::Rows(_) => "rows",
            ActionResult::Snapshot(_) => "snapshot",
        }
    }

    pub fn merge(&mut self, other: ActionResult) -> Result<()> {
        match (self, other) {
            (ActionResult::Count(a), ActionResult::Count(b)) => *a += b,
            (ActionResult::Sum(a), ActionResult::Sum(b)) => *a += b,
            (ActionResult::Histogram(a), ActionResult::Histogram(b)) => a.merge(&b)?,
            (ActionResult::Rows(a), ActionResult::Rows(b)) => {
                a.append(b).map_err(Error::Invariant)?
            }
            (a, b) => {
                return Err(Error::Invariant(format!(
                    "cannot merge {} result with {} result",
                    a.kind_name(),
                    b.kind_name()
                )))
            }
        }
        Ok(())
    }

    pub fn as_count(&self) -> Option<u64> {
        match self {
            ActionResult::Count(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_sum(&self) -> Option<f64> {
        match self {
            ActionResult::Sum(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_histogram(&self) -> Option<&Histogram1D> {
        match self {
            ActionResult::Histogram(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_snapshot(&self) -> Option<&SnapshotSummary> {
        match self {
            ActionResult::Snapshot(s) => Some(s),
            _ => None,
        }
    }
}

/// Results of one action keyed by variant tag (always including `"nominal"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantResult {
    results: BTreeMap<String, ActionResult>,
}

impl VariantResult {
    pub fn new(results: BTreeMap<String, ActionResult>) -> Self {
        Self { results }
    }

    pub fn nominal(&self) -> Option<&ActionResult> {
        self.results.get(NOMINAL)
    }

    pub fn get(&self, tag: &str) -> Option<&ActionResult> {
        self.results.get(tag)
    }

    pub fn tags(&self) -> Vec<String> {
        self.results.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ActionResult)> {
        self.results.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut ActionResult)> {
        self.results.iter_mut()
    }

    pub fn into_inner(self) -> BTreeMap<String, ActionResult> {
        self.results
    }

    /// Tag-wise merge; both sides must carry the same tag set.
    pub fn merge(&mut self, other: VariantResult) -> Result<()> {
        if self.results.len() != other.results.len() {
            return Err(Error::Invariant(format!(
                "variant sets differ: {:?} vs {:?}",
                self.tags(),
                other.tags()
            )));
        }
        for (tag, partial) in other.results {
            let mine = self.results.get_mut(&tag).ok_or_else(|| {
                Error::Invariant(format!("variant '{}' missing from merge target", tag))
            })?;
            mine.merge(partial)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(&str, u64)]) -> VariantResult {
        VariantResult::new(
            pairs
                .iter()
                .map(|(t, c)| (t.to_string(), ActionResult::Count(*c)))
                .collect(),
        )
    }

    #[test]
    fn merge_adds_per_tag() {
        let mut a = counts(&[(NOMINAL, 3), ("up", 1)]);
        a.merge(counts(&[(NOMINAL, 2), ("up", 4)])).unwrap();
        assert_eq!(a.nominal().and_then(|r| r.as_count()), Some(5));
        assert_eq!(a.get("up").and_then(|r| r.as_count()), Some(5));
    }

    #[test]
    fn merge_rejects_different_tag_sets() {
        let mut a = counts(&[(NOMINAL, 3), ("up", 1)]);
        assert!(a.merge(counts(&[(NOMINAL, 2), ("down", 4)])).is_err());
    }

    #[test]
    fn merge_rejects_kind_mismatch() {
        let mut a = ActionResult::Count(1);
        assert!(a.merge(ActionResult::Sum(1.0)).is_err());
    }
}
