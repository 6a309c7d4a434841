//! Runtime: the user-facing engine.
//!
//! `Engine` owns the collaborators (dataset source, snapshot sink, worker
//! pool, function registry). `Frame` is a position in a computation graph
//! bound to a dataset; its builder methods return new frames and never
//! change the receiver. Action methods return `ResultHandle`s, which trigger
//! their binding on first read.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use evgraph_core::action::{ActionKind, HistoModel, SnapshotOptions};
use evgraph_core::config::EngineConfig;
use evgraph_core::error::{Error, Result};
use evgraph_core::expr::Expr;
use evgraph_core::id::ActionId;
use evgraph_core::manifest::RunManifest;
use evgraph_core::result::{ActionResult, VariantResult};
use evgraph_core::spec::{DatasetSpec, SpecVersion, VersionedSpec};
use evgraph_io::{DatasetSource, FsSink, SnapshotSink};
use evgraph_operators::{FunctionRegistry, ScalarFunction};
use evgraph_planner::{GraphContext, GraphNode, GraphStep, NodeKind, ParsedAnalysis, PartitionPolicy};

use crate::layout::Layout;
use crate::metrics::PassCounter;
use crate::pool::{InlinePool, RayonPool, WorkerPool};
use crate::respec;
use crate::scheduler::{ActionSlot, Binding, ExecContext, IdCounters, Phase};
use crate::worker::Worker;

pub struct Engine {
    cfg: EngineConfig,
    source: Arc<dyn DatasetSource>,
    sink: Arc<dyn SnapshotSink>,
    pool: Arc<dyn WorkerPool>,
    functions: Arc<FunctionRegistry>,
    passes: Arc<PassCounter>,
    ids: Arc<IdCounters>,
}

impl Engine {
    /// Engine with builtin functions, snapshots written under
    /// `cfg.output_dir`, and a rayon pool unless `max_parallel_tasks` is 1.
    pub fn new(cfg: EngineConfig, source: Arc<dyn DatasetSource>) -> Result<Self> {
        cfg.validate()?;
        let pool: Arc<dyn WorkerPool> = if cfg.max_parallel_tasks == 1 {
            Arc::new(InlinePool)
        } else {
            Arc::new(RayonPool::new(cfg.max_parallel_tasks)?)
        };
        Ok(Self {
            sink: Arc::new(FsSink::new(&cfg.output_dir)),
            cfg,
            source,
            pool,
            functions: Arc::new(FunctionRegistry::with_builtins()),
            passes: Arc::new(PassCounter::new()),
            ids: Arc::new(IdCounters::default()),
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn SnapshotSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_pool(mut self, pool: Arc<dyn WorkerPool>) -> Self {
        self.pool = pool;
        self
    }

    /// Make a user function callable from expressions of frames created
    /// after this call.
    pub fn register_function(&mut self, f: impl ScalarFunction + 'static) -> &mut Self {
        Arc::make_mut(&mut self.functions).register(f);
        self
    }

    pub fn functions(&self) -> &Arc<FunctionRegistry> {
        &self.functions
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// Partition passes run by all bindings of this engine so far.
    pub fn partition_passes(&self) -> u64 {
        self.passes.get()
    }

    fn context(&self) -> Arc<ExecContext> {
        Arc::new(ExecContext {
            cfg: self.cfg.clone(),
            source: self.source.clone(),
            sink: self.sink.clone(),
            pool: self.pool.clone(),
            worker: Worker::new(self.source.clone(), self.passes.clone()),
            ids: self.ids.clone(),
        })
    }

    /// Root frame over `spec`. The spec is resolved now, so missing datasets
    /// and out-of-bounds ranges fail here.
    pub fn dataframe(&self, spec: DatasetSpec) -> Result<Frame> {
        let layout = Layout::resolve(&spec, self.source.as_ref())?;
        let root = GraphNode::source(GraphContext::new(layout.schema, self.functions.clone()));
        let binding = Binding::new(
            self.context(),
            root.clone(),
            Arc::new(VersionedSpec::initial(spec)),
            None,
        );
        Ok(Frame {
            binding,
            node: root,
        })
    }

    /// Frame over `rows` entries with no columns besides `_entry`.
    pub fn empty(&self, rows: u64) -> Result<Frame> {
        self.dataframe(DatasetSpec::empty(rows))
    }

    /// Build the graph of a parsed analysis file. All of its actions run in
    /// one pass.
    pub fn analysis(&self, parsed: &ParsedAnalysis) -> Result<Analysis> {
        let mut frame = self.dataframe(parsed.dataset.clone())?;
        if let Some(policy) = &parsed.partitions {
            frame.set_partition_policy(policy.clone())?;
        }
        for step in &parsed.steps {
            frame = match step {
                GraphStep::Define { name, expr } => frame.define(name, expr.clone())?,
                GraphStep::Filter { predicate, name } => {
                    frame.filter_named(predicate.clone(), name.clone())?
                }
                GraphStep::Vary {
                    column,
                    alternatives,
                    tags,
                } => frame.vary(column, alternatives.clone(), tags.clone())?,
            };
        }
        let outputs = parsed
            .actions
            .iter()
            .map(|a| {
                frame
                    .register(a.kind.clone(), a.variations)
                    .map(|h| (a.name.clone(), h))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Analysis { frame, outputs })
    }
}

/// Trigger several bindings; each still costs one pass per partition.
pub fn run_graphs(frames: &[&Frame]) -> Result<()> {
    for f in frames {
        f.trigger()?;
    }
    Ok(())
}

#[derive(Clone)]
pub struct Frame {
    binding: Arc<Binding>,
    node: Arc<GraphNode>,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("binding", &self.binding.id())
            .field("node", &self.node.id)
            .finish()
    }
}

impl Frame {
    fn at(&self, node: Arc<GraphNode>) -> Frame {
        Frame {
            binding: self.binding.clone(),
            node,
        }
    }

    pub fn binding(&self) -> &Arc<Binding> {
        &self.binding
    }

    pub fn node(&self) -> &Arc<GraphNode> {
        &self.node
    }

    pub fn column_names(&self) -> Vec<String> {
        self.node.column_names()
    }

    pub fn define(&self, name: &str, expr: Expr) -> Result<Frame> {
        Ok(self.at(self.node.define(name, expr)?))
    }

    pub fn filter(&self, predicate: Expr) -> Result<Frame> {
        self.filter_named(predicate, None)
    }

    pub fn filter_named(&self, predicate: Expr, name: Option<String>) -> Result<Frame> {
        Ok(self.at(self.node.filter(predicate, name)?))
    }

    /// Alternative definitions of `column`, one per tag.
    pub fn vary<S: Into<String>>(
        &self,
        column: &str,
        alternatives: Vec<Expr>,
        tags: impl IntoIterator<Item = S>,
    ) -> Result<Frame> {
        let tags = tags.into_iter().map(Into::into).collect();
        Ok(self.at(self.node.vary(column, alternatives, tags)?))
    }

    fn register(&self, kind: ActionKind, variations: bool) -> Result<ResultHandle> {
        let node = self.node.action(kind, variations)?;
        let slot = self.binding.register(node)?;
        Ok(ResultHandle::new(self.binding.clone(), slot))
    }

    pub fn count(&self) -> Result<ResultHandle> {
        self.register(ActionKind::Count, false)
    }

    pub fn sum(&self, column: &str) -> Result<ResultHandle> {
        self.register(
            ActionKind::Sum {
                column: column.to_string(),
            },
            false,
        )
    }

    pub fn histo1d(&self, model: HistoModel, column: &str, weight: Option<&str>) -> Result<ResultHandle> {
        self.register(
            ActionKind::Histo1D {
                model,
                column: column.to_string(),
                weight: weight.map(str::to_string),
            },
            false,
        )
    }

    /// Export the selected rows of `columns` (all visible columns when
    /// empty). Runs right away unless `options.lazy` is set.
    pub fn snapshot(&self, output: &str, columns: &[&str], options: SnapshotOptions) -> Result<ResultHandle> {
        let lazy = options.lazy;
        let handle = self.register(
            ActionKind::Snapshot {
                output: output.to_string(),
                columns: columns.iter().map(|c| c.to_string()).collect(),
                options,
            },
            false,
        )?;
        if !lazy {
            self.binding.trigger()?;
        }
        Ok(handle)
    }

    pub fn set_partition_policy(&self, policy: PartitionPolicy) -> Result<()> {
        self.binding.set_policy(Some(policy))
    }

    pub fn trigger(&self) -> Result<()> {
        self.binding.trigger()
    }

    pub fn runs(&self) -> Result<Vec<RunManifest>> {
        self.binding.runs()
    }

    pub fn explain(&self) -> Result<String> {
        self.binding.explain()
    }

    pub fn change_spec(&self, spec: DatasetSpec) -> Result<SpecVersion> {
        respec::change_spec(&self.binding, spec)
    }

    pub fn change_entry_range(&self, range: Range<u64>) -> Result<SpecVersion> {
        respec::change_entry_range(&self.binding, range)
    }
}

/// Lazy handle to one action's result.
#[derive(Clone)]
pub struct ResultHandle {
    binding: Arc<Binding>,
    slot: Arc<ActionSlot>,
}

impl std::fmt::Debug for ResultHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultHandle")
            .field("binding", &self.binding.id())
            .field("action", &self.slot.id)
            .field("ready", &self.slot.is_ready())
            .finish()
    }
}

impl ResultHandle {
    pub(crate) fn new(binding: Arc<Binding>, slot: Arc<ActionSlot>) -> Self {
        Self { binding, slot }
    }

    pub fn id(&self) -> ActionId {
        self.slot.id
    }

    pub(crate) fn slot(&self) -> &ActionSlot {
        &self.slot
    }

    pub fn binding(&self) -> &Arc<Binding> {
        &self.binding
    }

    pub fn node(&self) -> &Arc<GraphNode> {
        &self.slot.node
    }

    pub fn is_ready(&self) -> bool {
        self.slot.is_ready()
    }

    /// Spec version of the cached result, if computed.
    pub fn spec_version(&self) -> Option<SpecVersion> {
        self.slot.computed().map(|c| c.spec_version)
    }

    pub fn phase(&self) -> Result<Phase> {
        self.binding.phase()
    }

    /// All variants of the result. Triggers the binding if needed.
    pub fn result(&self) -> Result<Arc<VariantResult>> {
        Ok(self.binding.read(&self.slot)?.result)
    }

    /// Nominal value.
    pub fn value(&self) -> Result<ActionResult> {
        let r = self.result()?;
        r.nominal()
            .cloned()
            .ok_or_else(|| Error::Invariant(format!("{} has no nominal result", self.slot.id)))
    }

    pub fn change_spec(&self, spec: DatasetSpec) -> Result<SpecVersion> {
        respec::change_spec(&self.binding, spec)
    }

    pub fn change_entry_range(&self, range: Range<u64>) -> Result<SpecVersion> {
        respec::change_entry_range(&self.binding, range)
    }
}

/// Result of an action together with its variations.
#[derive(Debug, Clone)]
pub struct VariationsHandle {
    handle: ResultHandle,
}

impl VariationsHandle {
    /// Variant tags, nominal first. Known without triggering.
    pub fn tags(&self) -> Vec<String> {
        self.handle.node().variant_tags()
    }

    pub fn handle(&self) -> &ResultHandle {
        &self.handle
    }

    pub fn result(&self) -> Result<Arc<VariantResult>> {
        self.handle.result()
    }

    pub fn get(&self, tag: &str) -> Result<ActionResult> {
        self.result()?
            .get(tag)
            .cloned()
            .ok_or_else(|| Error::Plan(format!("no variation '{}'; known: {:?}", tag, self.tags())))
    }
}

/// Variations of the action behind `handle`. A plain action gets a
/// variation-enabled sibling registered on the same binding, so asking
/// before the first trigger costs no extra pass.
pub fn variations_for(handle: &ResultHandle) -> Result<VariationsHandle> {
    let node = handle.node();
    match &node.kind {
        NodeKind::Action {
            variations: true, ..
        } => Ok(VariationsHandle {
            handle: handle.clone(),
        }),
        NodeKind::Action {
            kind: ActionKind::Snapshot { .. },
            ..
        } => Err(Error::Plan("snapshots have no variations".into())),
        NodeKind::Action { kind, .. } => {
            let upstream = node
                .upstream
                .as_ref()
                .ok_or_else(|| Error::Invariant(format!("action {} has no upstream", node.id)))?;
            let sibling = upstream.action(kind.clone(), true)?;
            let slot = handle.binding.register(sibling)?;
            Ok(VariationsHandle {
                handle: ResultHandle::new(handle.binding.clone(), slot),
            })
        }
        other => Err(Error::Invariant(format!("{} node behind a result", other.label()))),
    }
}

/// Graph and named results of an analysis file.
#[derive(Debug)]
pub struct Analysis {
    frame: Frame,
    outputs: Vec<(String, ResultHandle)>,
}

impl Analysis {
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn outputs(&self) -> &[(String, ResultHandle)] {
        &self.outputs
    }

    pub fn run(&self) -> Result<BTreeMap<String, Arc<VariantResult>>> {
        self.frame.trigger()?;
        self.outputs
            .iter()
            .map(|(name, h)| Ok((name.clone(), h.result()?)))
            .collect()
    }
}
