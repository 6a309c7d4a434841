//! Resolve a `DatasetSpec` against a dataset source.
//!
//! Samples are concatenated in declaration order into one logical entry
//! space `[0, total)`; an optional global range then narrows it to the span
//! that gets partitioned. A partition's logical range maps back to one
//! physical read per sample it touches.

use std::ops::Range;

use evgraph_core::error::{Error, Result};
use evgraph_core::schema::Schema;
use evgraph_core::spec::{DatasetSpec, SampleSource};
use evgraph_io::DatasetSource;

/// One sample's contribution to the logical entry space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Dataset to read, `None` for an empty source.
    pub dataset: Option<String>,
    pub logical: Range<u64>,
    pub physical: Range<u64>,
}

impl Segment {
    pub fn len(&self) -> u64 {
        self.logical.end - self.logical.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub schema: Schema,
    /// Entries across all samples.
    pub total: u64,
    /// Span to partition, within `0..total`.
    pub span: Range<u64>,
    segments: Vec<Segment>,
}

fn out_of_bounds(what: &str, r: &Range<u64>, rows: u64) -> Error {
    Error::OverlapOrGap(format!(
        "{} [{}, {}) exceeds {} available entries",
        what, r.start, r.end, rows
    ))
}

fn same_columns(a: &Schema, b: &Schema) -> bool {
    let key = |s: &Schema| {
        let mut v: Vec<_> = s.fields.iter().map(|f| (f.name.clone(), f.data_type)).collect();
        v.sort_by(|x, y| x.0.cmp(&y.0));
        v
    };
    key(a) == key(b)
}

impl Layout {
    pub fn resolve(spec: &DatasetSpec, source: &dyn DatasetSource) -> Result<Layout> {
        spec.validate()?;
        let mut schema: Option<Schema> = None;
        let mut named = 0usize;
        let mut segments = Vec::with_capacity(spec.samples.len());
        let mut total = 0u64;

        for sample in &spec.samples {
            let (dataset, rows) = match &sample.source {
                SampleSource::Named(name) => {
                    let info = source.open(name)?;
                    match &schema {
                        None => schema = Some(info.schema),
                        Some(s) if same_columns(s, &info.schema) => {}
                        Some(_) => {
                            return Err(Error::TypeMismatch(format!(
                                "sample '{}' ({}) has different columns than the first sample",
                                sample.name, name
                            )))
                        }
                    }
                    named += 1;
                    (Some(name.clone()), info.rows)
                }
                SampleSource::Empty { rows } => (None, *rows),
            };
            let physical = match &sample.entries {
                Some(r) if r.end > rows => {
                    return Err(out_of_bounds(&format!("sample '{}'", sample.name), r, rows))
                }
                Some(r) => r.clone(),
                None => 0..rows,
            };
            let len = physical.end - physical.start;
            segments.push(Segment {
                dataset,
                logical: total..total + len,
                physical,
            });
            total += len;
        }

        if named > 0 && named < spec.samples.len() {
            return Err(Error::Config(
                "empty sources cannot be mixed with named datasets".into(),
            ));
        }

        let span = match &spec.global_range {
            Some(r) if r.end > total => return Err(out_of_bounds("global range", r, total)),
            Some(r) => r.clone(),
            None => 0..total,
        };

        Ok(Layout {
            schema: schema.unwrap_or_else(Schema::empty),
            total,
            span,
            segments,
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The pieces of each segment that fall inside `range`, in order.
    pub fn reads(&self, range: &Range<u64>) -> Vec<Segment> {
        self.segments
            .iter()
            .filter_map(|s| {
                let start = s.logical.start.max(range.start);
                let end = s.logical.end.min(range.end);
                (start < end).then(|| {
                    let offset = start - s.logical.start;
                    Segment {
                        dataset: s.dataset.clone(),
                        logical: start..end,
                        physical: s.physical.start + offset..s.physical.start + offset + (end - start),
                    }
                })
            })
            .collect()
    }

    /// Every column of `expected` must exist here with the same type.
    pub fn check_schema(&self, expected: &Schema) -> Result<()> {
        for f in &expected.fields {
            match self.schema.field_named(&f.name) {
                None => return Err(Error::UndefinedColumn(f.name.clone())),
                Some(g) if g.data_type != f.data_type => {
                    return Err(Error::TypeMismatch(format!(
                        "column '{}' is {} in the new spec, graph expects {}",
                        f.name, g.data_type, f.data_type
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}
