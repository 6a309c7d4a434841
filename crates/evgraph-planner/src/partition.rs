//! Partition/Range Planner.
//!
//! Splits the logical row span of a binding into contiguous, disjoint
//! partitions whose union is the span exactly once. The plan is a pure
//! function of (span, policy), so re-running the same plan assigns the same
//! rows to the same partition ids.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use evgraph_core::error::{Error, Result};
use evgraph_core::id::PartitionId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub id: PartitionId,
    /// Logical entry range.
    pub range: Range<u64>,
}

impl Partition {
    pub fn len(&self) -> u64 {
        self.range.end - self.range.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionPolicy {
    /// `n` near-equal contiguous ranges.
    Count(usize),
    /// Caller-supplied ordered ranges that must tile the span.
    Explicit(Vec<Range<u64>>),
}

fn fmt_range(r: &Range<u64>) -> String {
    format!("[{}, {})", r.start, r.end)
}

pub fn plan_partitions(span: &Range<u64>, policy: &PartitionPolicy) -> Result<Vec<Partition>> {
    if span.start >= span.end {
        return Err(Error::EmptyRange(format!("span {}", fmt_range(span))));
    }
    let ranges = match policy {
        PartitionPolicy::Count(n) => count_ranges(span, *n)?,
        PartitionPolicy::Explicit(ranges) => {
            check_tiling(span, ranges)?;
            ranges.clone()
        }
    };
    Ok(ranges
        .into_iter()
        .enumerate()
        .map(|(i, range)| Partition {
            id: PartitionId::new(i as u64),
            range,
        })
        .collect())
}

fn count_ranges(span: &Range<u64>, n: usize) -> Result<Vec<Range<u64>>> {
    if n == 0 {
        return Err(Error::Config("partition count must be at least 1".into()));
    }
    let len = span.end - span.start;
    let n = n as u64;
    if n > len {
        return Err(Error::EmptyRange(format!(
            "{} partitions over {} leaves some empty",
            n,
            fmt_range(span)
        )));
    }
    let base = len / n;
    let rem = len % n;
    let mut out = Vec::with_capacity(n as usize);
    let mut start = span.start;
    for i in 0..n {
        let size = base + u64::from(i < rem);
        out.push(start..start + size);
        start += size;
    }
    Ok(out)
}

fn check_tiling(span: &Range<u64>, ranges: &[Range<u64>]) -> Result<()> {
    if ranges.is_empty() {
        return Err(Error::EmptyRange("no explicit ranges given".into()));
    }
    if let Some(r) = ranges.iter().find(|r| r.start >= r.end) {
        return Err(Error::EmptyRange(fmt_range(r)));
    }
    let mut cursor = span.start;
    for r in ranges {
        if r.start != cursor {
            let what = if r.start < cursor { "overlaps" } else { "leaves a gap before" };
            return Err(Error::OverlapOrGap(format!(
                "{} {} position {}",
                fmt_range(r),
                what,
                cursor
            )));
        }
        cursor = r.end;
    }
    if cursor != span.end {
        return Err(Error::OverlapOrGap(format!(
            "ranges end at {}, span {} ends at {}",
            cursor,
            fmt_range(span),
            span.end
        )));
    }
    Ok(())
}
