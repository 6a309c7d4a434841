//! Worker executor: one pass over one partition for every action of a program.
//!
//! Rows are evaluated one at a time. Each slot value is memoized per row
//! under its *effective* tag: under variant `t`, a value that is not
//! sensitive to `t` is the nominal value and is computed once for all such
//! variants. Variants an action is not sensitive to at all are not filled;
//! their partial is a copy of the nominal one.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use evgraph_core::error::{Error, Result};
use evgraph_core::id::{ActionId, NodeId, SlotId};
use evgraph_core::result::{ActionResult, VariantResult, NOMINAL};
use evgraph_core::types::{Column, Scalar};
use evgraph_io::DatasetSource;
use evgraph_operators::{evaluate, make_operator, ActionOperator, FunctionRegistry};
use evgraph_planner::variation::{effective, TagSet};
use evgraph_planner::{BoundExpr, FilterDef, Partition, Program, SlotDef};

use crate::layout::Layout;
use crate::metrics::PassCounter;

/// Partial results of one partition, keyed by action.
pub type PartialResults = BTreeMap<ActionId, VariantResult>;

/// Everything a worker needs to run a partition of one binding.
#[derive(Debug, Clone)]
pub struct BoundGraph {
    pub program: Program,
    pub layout: Layout,
    pub functions: Arc<FunctionRegistry>,
}

pub struct Worker {
    source: Arc<dyn DatasetSource>,
    passes: Arc<PassCounter>,
}

impl Worker {
    pub fn new(source: Arc<dyn DatasetSource>, passes: Arc<PassCounter>) -> Self {
        Self { source, passes }
    }

    pub fn passes(&self) -> &Arc<PassCounter> {
        &self.passes
    }

    /// Run every action of `graph` over the rows of `partition`.
    ///
    /// Safe to retry: the result depends only on `(graph, partition)` and the
    /// source contents. Errors and panics are attributed to the partition.
    pub fn run_partition(&self, graph: &BoundGraph, partition: &Partition) -> Result<PartialResults> {
        self.passes.record();
        match panic::catch_unwind(AssertUnwindSafe(|| self.pass(graph, partition))) {
            Ok(r) => r.map_err(|e| e.in_partition(partition.id)),
            Err(payload) => {
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(Error::Invariant(format!("worker panicked: {}", msg)).in_partition(partition.id))
            }
        }
    }

    fn pass(&self, graph: &BoundGraph, partition: &Partition) -> Result<PartialResults> {
        let program = &graph.program;
        let plan = RowPlan::new(program);
        let ops: Vec<Box<dyn ActionOperator>> =
            program.actions.iter().map(|a| make_operator(&a.kind)).collect();

        // Per action, the tags that need their own fill.
        let mut accs: Vec<Vec<(usize, ActionResult)>> = program
            .actions
            .iter()
            .zip(&ops)
            .map(|(a, op)| {
                a.tags
                    .iter()
                    .filter(|t| effective(t, &a.sens) == t.as_str())
                    .map(|t| (plan.tag_index(t), op.init()))
                    .collect()
            })
            .collect();

        let wanted = program.dataset_columns();
        for seg in graph.layout.reads(&partition.range) {
            let batch = match &seg.dataset {
                Some(name) if !wanted.is_empty() => {
                    let b = self.source.read_range(name, seg.physical.clone(), &wanted)?;
                    if b.num_rows() as u64 != seg.len() {
                        return Err(Error::IoFailure(format!(
                            "dataset '{}' returned {} rows for {} requested",
                            name,
                            b.num_rows(),
                            seg.len()
                        )));
                    }
                    b
                }
                _ => Default::default(),
            };
            let columns: HashMap<SlotId, &Column> = program
                .slots
                .iter()
                .filter_map(|(id, def)| match def {
                    SlotDef::Dataset { column } => batch.column(column).map(|c| (*id, c)),
                    _ => None,
                })
                .collect();

            let mut row = Row {
                plan: &plan,
                functions: &graph.functions,
                columns: &columns,
                index: 0,
                entry: 0,
                values: HashMap::new(),
                passed: HashMap::new(),
            };
            for i in 0..seg.len() {
                row.reset(i as usize, seg.logical.start + i);
                for ((action, op), acc) in program.actions.iter().zip(&ops).zip(accs.iter_mut()) {
                    for (tag, result) in acc.iter_mut() {
                        if !row.selected(&action.filters, *tag)? {
                            continue;
                        }
                        let values = action
                            .inputs
                            .iter()
                            .map(|s| row.value(*s, *tag))
                            .collect::<Result<Vec<_>>>()?;
                        op.fill(result, &values)?;
                    }
                }
            }
        }

        let mut out = PartialResults::new();
        for (action, acc) in program.actions.iter().zip(accs) {
            let mut filled: BTreeMap<&str, ActionResult> =
                acc.into_iter().map(|(t, r)| (plan.tags[t], r)).collect();
            let nominal = filled
                .get(NOMINAL)
                .cloned()
                .ok_or_else(|| Error::Invariant(format!("action {} has no nominal fill", action.id)))?;
            let results = action
                .tags
                .iter()
                .map(|t| {
                    let r = filled.remove(t.as_str()).unwrap_or_else(|| nominal.clone());
                    (t.clone(), r)
                })
                .collect();
            out.insert(action.id, VariantResult::new(results));
        }
        Ok(out)
    }
}

struct PlannedSlot<'p> {
    def: &'p SlotDef,
    /// Effective tag index for each tag index.
    eff: Vec<usize>,
}

struct PlannedFilter<'p> {
    def: &'p FilterDef,
    eff: Vec<usize>,
}

/// Tag indices and effective-tag tables for a program. Index 0 is nominal.
struct RowPlan<'p> {
    tags: Vec<&'p str>,
    slots: HashMap<SlotId, PlannedSlot<'p>>,
    filters: HashMap<NodeId, PlannedFilter<'p>>,
}

impl<'p> RowPlan<'p> {
    fn new(program: &'p Program) -> Self {
        let mut all: BTreeSet<&'p str> = BTreeSet::new();
        for a in &program.actions {
            all.extend(a.tags.iter().map(String::as_str));
        }
        for def in program.slots.values() {
            if let Some(sens) = def.sens() {
                all.extend(sens.iter().map(String::as_str));
            }
        }
        all.remove(NOMINAL);
        let mut tags = vec![NOMINAL];
        tags.extend(all);

        let table = |sens: &TagSet| -> Vec<usize> {
            tags.iter()
                .enumerate()
                .map(|(i, t)| if effective(t, sens) == *t { i } else { 0 })
                .collect()
        };
        let nominal_only = vec![0; tags.len()];

        let slots = program
            .slots
            .iter()
            .map(|(id, def)| {
                let eff = def.sens().map(&table).unwrap_or_else(|| nominal_only.clone());
                (*id, PlannedSlot { def, eff })
            })
            .collect();
        let filters = program
            .filters
            .iter()
            .map(|(id, def)| {
                (
                    *id,
                    PlannedFilter {
                        def,
                        eff: table(&def.sens),
                    },
                )
            })
            .collect();

        RowPlan {
            tags,
            slots,
            filters,
        }
    }

    fn tag_index(&self, tag: &str) -> usize {
        self.tags.iter().position(|t| *t == tag).unwrap_or(0)
    }
}

/// Evaluation state for the current row.
struct Row<'p, 'b> {
    plan: &'p RowPlan<'p>,
    functions: &'p FunctionRegistry,
    columns: &'b HashMap<SlotId, &'b Column>,
    index: usize,
    entry: u64,
    values: HashMap<(SlotId, usize), Scalar>,
    passed: HashMap<(NodeId, usize), bool>,
}

impl<'p, 'b> Row<'p, 'b> {
    fn reset(&mut self, index: usize, entry: u64) {
        self.index = index;
        self.entry = entry;
        self.values.clear();
        self.passed.clear();
    }

    /// Whether the row passes every filter of the chain under `tag`.
    fn selected(&mut self, chain: &[NodeId], tag: usize) -> Result<bool> {
        for id in chain {
            if !self.passes(*id, tag)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn passes(&mut self, id: NodeId, tag: usize) -> Result<bool> {
        let plan = self.plan;
        let f = plan
            .filters
            .get(&id)
            .ok_or_else(|| Error::Invariant(format!("filter {} missing from program", id)))?;
        let eff = f.eff[tag];
        if let Some(p) = self.passed.get(&(id, eff)) {
            return Ok(*p);
        }
        // Null and false both reject.
        let p = matches!(self.eval(&f.def.predicate, eff)?, Scalar::Bool(true));
        self.passed.insert((id, eff), p);
        Ok(p)
    }

    fn value(&mut self, slot: SlotId, tag: usize) -> Result<Scalar> {
        let plan = self.plan;
        let s = plan
            .slots
            .get(&slot)
            .ok_or_else(|| Error::Invariant(format!("slot {} missing from program", slot)))?;
        let eff = s.eff[tag];
        if let Some(v) = self.values.get(&(slot, eff)) {
            return Ok(v.clone());
        }
        let v = match s.def {
            SlotDef::Dataset { column } => self
                .columns
                .get(&slot)
                .and_then(|c| c.values.get(self.index))
                .cloned()
                .ok_or_else(|| Error::UndefinedColumn(column.clone()))?,
            SlotDef::Entry => Scalar::I64(self.entry as i64),
            SlotDef::Defined { expr, .. } => self.eval(expr, eff)?,
            SlotDef::Varied {
                base, alternatives, ..
            } => match alternatives.get(plan.tags[eff]) {
                Some(alt) => self.eval(alt, eff)?,
                None => self.value(*base, eff)?,
            },
        };
        self.values.insert((slot, eff), v.clone());
        Ok(v)
    }

    fn eval(&mut self, bound: &'p BoundExpr, tag: usize) -> Result<Scalar> {
        let functions = self.functions;
        let mut ctx = |name: &str| -> Result<Scalar> {
            let slot = bound
                .bindings
                .get(name)
                .ok_or_else(|| Error::UndefinedColumn(name.to_string()))?;
            self.value(*slot, tag)
        };
        evaluate(&bound.expr, &mut ctx, functions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evgraph_core::action::{ActionKind, HistoModel};
    use evgraph_core::expr::{col, lit};
    use evgraph_core::id::PartitionId;
    use evgraph_core::spec::DatasetSpec;
    use evgraph_core::types::RowBatch;
    use evgraph_io::MemorySource;
    use evgraph_operators::FunctionRegistry;
    use evgraph_planner::{lower_actions, GraphContext, GraphNode};

    fn setup() -> (Arc<MemorySource>, Arc<GraphNode>) {
        let src = MemorySource::new();
        let x = (0..20).map(|i| Scalar::F64(i as f64)).collect();
        let w = (0..20).map(|_| Scalar::F64(2.0)).collect();
        src.insert(
            "events",
            RowBatch::new(vec![Column::new("x", x), Column::new("w", w)]),
        )
        .unwrap();
        let info = src.open("events").unwrap();
        let root = GraphNode::source(GraphContext::new(
            info.schema,
            Arc::new(FunctionRegistry::with_builtins()),
        ));
        (Arc::new(src), root)
    }

    fn bind(src: &MemorySource, actions: &[(ActionId, Arc<GraphNode>)], root: &GraphNode) -> BoundGraph {
        BoundGraph {
            program: lower_actions(actions).unwrap(),
            layout: Layout::resolve(&DatasetSpec::single("events"), src).unwrap(),
            functions: root.context().functions().clone(),
        }
    }

    fn part(id: u64, range: std::ops::Range<u64>) -> Partition {
        Partition {
            id: PartitionId::new(id),
            range,
        }
    }

    #[test]
    fn variants_share_unaffected_values() {
        let (src, root) = setup();
        let v = root
            .vary("w", vec![col("w").mul(lit(3.0))], vec!["w_up".into()])
            .unwrap()
            .filter(col("x").lt(lit(10.0)), None)
            .unwrap();
        let sum = v
            .action(ActionKind::Sum { column: "w".into() }, true)
            .unwrap();
        let count = v.action(ActionKind::Count, true).unwrap();
        let graph = bind(
            &src,
            &[(ActionId::new(0), sum), (ActionId::new(1), count)],
            &root,
        );
        let passes = Arc::new(PassCounter::new());
        let worker = Worker::new(src, passes.clone());

        let out = worker.run_partition(&graph, &part(0, 0..20)).unwrap();
        let s = &out[&ActionId::new(0)];
        assert_eq!(s.nominal().and_then(|r| r.as_sum()), Some(20.0));
        assert_eq!(s.get("w_up").and_then(|r| r.as_sum()), Some(60.0));
        // Count does not read w: the variant is a copy of nominal.
        let c = &out[&ActionId::new(1)];
        assert_eq!(c.get("w_up"), c.nominal());
        assert_eq!(passes.get(), 1);
    }

    #[test]
    fn entry_column_is_the_logical_index() {
        let (src, root) = setup();
        let h = root
            .filter(col("_entry").gt_eq(lit(15i64)), None)
            .unwrap()
            .action(
                ActionKind::Histo1D {
                    model: HistoModel::new("e", 20, 0.0, 20.0),
                    column: "_entry".into(),
                    weight: None,
                },
                false,
            )
            .unwrap();
        let graph = bind(&src, &[(ActionId::new(0), h)], &root);
        let worker = Worker::new(src, Arc::new(PassCounter::new()));
        let out = worker.run_partition(&graph, &part(1, 10..20)).unwrap();
        let hist = out[&ActionId::new(0)].nominal().and_then(|r| r.as_histogram()).cloned().unwrap();
        assert_eq!(hist.integral(), 5.0);
        assert_eq!(hist.bin_content(16), 1.0);
    }

    #[test]
    fn failures_name_the_partition() {
        let (src, root) = setup();
        let mut funcs = FunctionRegistry::with_builtins();
        funcs.register_fn("boom", evgraph_core::schema::DataType::Float64, |_| {
            Err(Error::Invariant("boom".into()))
        });
        let ctx = GraphContext::new(root.context().schema().clone(), Arc::new(funcs));
        let root = GraphNode::source(ctx);
        let s = root
            .define("y", evgraph_core::expr::call("boom", vec![]))
            .unwrap()
            .action(ActionKind::Sum { column: "y".into() }, false)
            .unwrap();
        let graph = bind(&src, &[(ActionId::new(0), s)], &root);
        let worker = Worker::new(src, Arc::new(PassCounter::new()));
        match worker.run_partition(&graph, &part(3, 0..5)) {
            Err(Error::PartitionFailure { partition, .. }) => assert_eq!(partition, PartitionId::new(3)),
            other => panic!("unexpected {:?}", other),
        }
    }
}
