//! Lazy action scheduler.
//!
//! A `Binding` ties one computation graph to one versioned dataset spec and
//! owns the list of pending actions. Nothing runs until a result is read or
//! `trigger` is called; then every pending action is lowered into a single
//! program and each partition is passed over exactly once.
//!
//! State machine: `Unbound -> Bound -> Triggered`. Registering an action on a
//! triggered binding moves it back to `Bound`; the next trigger costs a fresh
//! pass and leaves already cached results untouched.
//!
//! Cached results pin the spec. To rerun an action over another slice,
//! clone it: the clone is a new pending slot on the same binding. While only
//! clones are pending the spec may be replaced, and one trigger then runs
//! every pending clone against the new spec. Cached slots keep the result and
//! spec version they were computed with.
//!
//! The state mutex is held for the whole trigger. A concurrent second trigger
//! waits, then finds no pending work and returns; readers see the results the
//! first trigger installed.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use once_cell::sync::OnceCell;

use evgraph_core::action::ActionKind;
use evgraph_core::config::EngineConfig;
use evgraph_core::error::{Error, Result};
use evgraph_core::id::{ActionId, BindingId};
use evgraph_core::manifest::RunManifest;
use evgraph_core::result::{ActionResult, SnapshotSummary, VariantResult};
use evgraph_core::spec::{DatasetSpec, SpecVersion, VersionedSpec};
use evgraph_io::{DatasetSource, SnapshotSink};
use evgraph_planner::{lower_actions, plan_partitions, GraphNode, NodeKind, PartitionPolicy};

use crate::layout::Layout;
use crate::metrics::emit_span;
use crate::pool::WorkerPool;
use crate::replay::{hash_program, hash_spec, now_millis};
use crate::worker::{BoundGraph, Worker};

#[derive(Debug, Default)]
pub(crate) struct IdCounters {
    bindings: AtomicU64,
    actions: AtomicU64,
}

impl IdCounters {
    fn binding(&self) -> BindingId {
        BindingId::new(self.bindings.fetch_add(1, Ordering::Relaxed))
    }

    fn action(&self) -> ActionId {
        ActionId::new(self.actions.fetch_add(1, Ordering::Relaxed))
    }
}

/// Collaborators shared by every binding created from one engine.
pub struct ExecContext {
    pub cfg: EngineConfig,
    pub source: Arc<dyn DatasetSource>,
    pub sink: Arc<dyn SnapshotSink>,
    pub pool: Arc<dyn WorkerPool>,
    pub worker: Worker,
    pub(crate) ids: Arc<IdCounters>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No action registered yet.
    Unbound,
    /// Actions pending.
    Bound,
    /// Every registered action has a cached result.
    Triggered,
}

/// A merged result and the spec version it was computed against.
#[derive(Debug, Clone)]
pub struct Computed {
    pub result: Arc<VariantResult>,
    pub spec_version: SpecVersion,
}

/// One registered action. The cell is written once, by a successful trigger.
#[derive(Debug)]
pub struct ActionSlot {
    pub id: ActionId,
    pub node: Arc<GraphNode>,
    clone_of: Option<ActionId>,
    cell: OnceCell<Computed>,
}

impl ActionSlot {
    /// The action this slot was cloned from.
    pub fn clone_of(&self) -> Option<ActionId> {
        self.clone_of
    }

    pub fn computed(&self) -> Option<&Computed> {
        self.cell.get()
    }

    pub fn is_ready(&self) -> bool {
        self.cell.get().is_some()
    }
}

struct BindingState {
    spec: Arc<VersionedSpec>,
    policy: Option<PartitionPolicy>,
    pending: Vec<Arc<ActionSlot>>,
    phase: Phase,
    runs: Vec<RunManifest>,
}

impl BindingState {
    /// A spec with cached results behind it may only change while nothing
    /// but clones is pending.
    fn spec_pinned(&self) -> bool {
        let only_clones =
            !self.pending.is_empty() && self.pending.iter().all(|s| s.clone_of.is_some());
        !self.runs.is_empty() && !only_clones
    }
}

pub struct Binding {
    id: BindingId,
    root: Arc<GraphNode>,
    exec: Arc<ExecContext>,
    state: Mutex<BindingState>,
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("id", &self.id)
            .field("root", &self.root.id)
            .finish()
    }
}

impl Binding {
    pub(crate) fn new(
        exec: Arc<ExecContext>,
        root: Arc<GraphNode>,
        spec: Arc<VersionedSpec>,
        policy: Option<PartitionPolicy>,
    ) -> Arc<Binding> {
        Arc::new(Binding {
            id: exec.ids.binding(),
            root,
            exec,
            state: Mutex::new(BindingState {
                spec,
                policy,
                pending: Vec::new(),
                phase: Phase::Unbound,
                runs: Vec::new(),
            }),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, BindingState>> {
        self.state
            .lock()
            .map_err(|_| Error::Invariant(format!("{} state lock poisoned", self.id)))
    }

    pub fn id(&self) -> BindingId {
        self.id
    }

    pub fn root(&self) -> &Arc<GraphNode> {
        &self.root
    }

    pub fn context(&self) -> &Arc<ExecContext> {
        &self.exec
    }

    pub fn phase(&self) -> Result<Phase> {
        Ok(self.lock()?.phase)
    }

    pub fn spec(&self) -> Result<Arc<VersionedSpec>> {
        Ok(self.lock()?.spec.clone())
    }

    pub fn pending(&self) -> Result<usize> {
        Ok(self.lock()?.pending.len())
    }

    /// Manifests of the successful triggers, oldest first.
    pub fn runs(&self) -> Result<Vec<RunManifest>> {
        Ok(self.lock()?.runs.clone())
    }

    /// `None` splits the span into `npartitions` from the engine config.
    pub fn set_policy(&self, policy: Option<PartitionPolicy>) -> Result<()> {
        self.lock()?.policy = policy;
        Ok(())
    }

    pub fn register(&self, node: Arc<GraphNode>) -> Result<Arc<ActionSlot>> {
        self.push_slot(node, None)
    }

    /// Fresh pending registration of `slot`'s action. The original keeps its
    /// cached result.
    pub fn clone_slot(&self, slot: &ActionSlot) -> Result<Arc<ActionSlot>> {
        let cloned = self.push_slot(slot.node.clone(), Some(slot.id))?;
        #[cfg(feature = "tracing")]
        tracing::debug!(binding = %self.id, from = %slot.id, to = %cloned.id, "action cloned");
        Ok(cloned)
    }

    fn push_slot(&self, node: Arc<GraphNode>, clone_of: Option<ActionId>) -> Result<Arc<ActionSlot>> {
        if !node.is_action() {
            return Err(Error::Plan(format!("{} is not an action", node.id)));
        }
        if !Arc::ptr_eq(&node.root(), &self.root) {
            return Err(Error::Plan(format!(
                "{} belongs to a different graph than {}",
                node.id, self.id
            )));
        }
        let slot = Arc::new(ActionSlot {
            id: self.exec.ids.action(),
            node,
            clone_of,
            cell: OnceCell::new(),
        });
        let mut st = self.lock()?;
        st.pending.push(slot.clone());
        st.phase = Phase::Bound;
        Ok(slot)
    }

    /// Cached result of `slot`, triggering the binding first if needed.
    pub fn read(&self, slot: &ActionSlot) -> Result<Computed> {
        if let Some(c) = slot.computed() {
            return Ok(c.clone());
        }
        self.trigger()?;
        slot.computed().cloned().ok_or_else(|| {
            Error::Invariant(format!("{} not computed by {}", slot.id, self.id))
        })
    }

    /// Run all pending actions: one pass per partition, merged in partition
    /// order. On failure nothing is cached and the binding stays `Bound`.
    pub fn trigger(&self) -> Result<()> {
        let mut st = self.lock()?;
        if st.pending.is_empty() {
            return Ok(());
        }
        let started = now_millis();
        let spec = st.spec.clone();
        let pairs: Vec<_> = st.pending.iter().map(|a| (a.id, a.node.clone())).collect();

        let program = lower_actions(&pairs)?;
        let layout = Layout::resolve(&spec.spec, self.exec.source.as_ref())?;
        let policy = st
            .policy
            .clone()
            .unwrap_or(PartitionPolicy::Count(self.exec.cfg.npartitions));
        let partitions = plan_partitions(&layout.span, &policy)?;
        let program_hash = hash_program(&program)?;
        let spec_hash = hash_spec(&spec, &partitions)?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            binding = %self.id,
            spec_version = %spec.version,
            partitions = partitions.len(),
            actions = pairs.len(),
            pool = self.exec.pool.name(),
            "trigger start"
        );

        let graph = BoundGraph {
            program,
            layout,
            functions: self.root.context().functions().clone(),
        };
        let worker = &self.exec.worker;
        let outcomes = self
            .exec
            .pool
            .map_partitions(&partitions, &|p| worker.run_partition(&graph, p));

        let mut merged: BTreeMap<ActionId, VariantResult> = BTreeMap::new();
        let mut done = 0usize;
        for (part, outcome) in partitions.iter().zip(outcomes) {
            let partial = match outcome {
                Ok(partial) => partial,
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(binding = %self.id, partition = %part.id, error = %e, "partition failed");
                    return Err(e);
                }
            };
            #[cfg(feature = "tracing")]
            tracing::debug!(binding = %self.id, partition = %part.id, rows = part.len(), "partition done");
            for (id, result) in partial {
                match merged.entry(id) {
                    Entry::Vacant(v) => {
                        v.insert(result);
                    }
                    Entry::Occupied(mut o) => o.get_mut().merge(result)?,
                }
            }
            done += 1;
        }
        if done != partitions.len() {
            return Err(Error::Invariant(format!(
                "{} of {} partitions reported",
                done,
                partitions.len()
            )));
        }

        for slot in &st.pending {
            if let NodeKind::Action { kind, .. } = &slot.node.kind {
                if let Some(result) = merged.get_mut(&slot.id) {
                    self.finish_snapshot(kind, result)?;
                }
            }
        }

        let pending = std::mem::take(&mut st.pending);
        for slot in &pending {
            let result = merged.remove(&slot.id).ok_or_else(|| {
                Error::Invariant(format!("no merged result for {}", slot.id))
            })?;
            // First writer wins; the lock makes this the only writer.
            let _ = slot.cell.set(Computed {
                result: Arc::new(result),
                spec_version: spec.version,
            });
        }

        let mut manifest = RunManifest::new(self.id, program_hash, spec_hash, spec.version, started)
            .finish(now_millis(), partitions.len(), pending.len());
        manifest.seed = self.exec.cfg.seed;
        emit_span(
            "trigger",
            &[
                ("binding", self.id.to_string()),
                ("partitions", partitions.len().to_string()),
                ("program_hash", manifest.program_hash.to_hex()),
            ],
        );
        #[cfg(feature = "tracing")]
        tracing::info!(
            binding = %self.id,
            actions = pending.len(),
            elapsed_ms = manifest.finished_ms - manifest.started_ms,
            "trigger finished"
        );
        st.runs.push(manifest);
        st.phase = Phase::Triggered;
        Ok(())
    }

    /// Write the selected rows of a snapshot and keep only a summary.
    fn finish_snapshot(&self, kind: &ActionKind, result: &mut VariantResult) -> Result<()> {
        let ActionKind::Snapshot {
            output,
            columns,
            options,
        } = kind
        else {
            return Ok(());
        };
        let stats = match result.nominal() {
            Some(ActionResult::Rows(rows)) => self.exec.sink.write(output, columns, rows, options)?,
            other => {
                return Err(Error::Invariant(format!(
                    "snapshot '{}' produced {:?}",
                    output,
                    other.map(ActionResult::kind_name)
                )))
            }
        };
        #[cfg(feature = "tracing")]
        tracing::debug!(output = %output, rows = stats.rows, flushes = stats.flushes, "snapshot written");
        for (_, r) in result.iter_mut() {
            *r = ActionResult::Snapshot(SnapshotSummary {
                output: output.clone(),
                columns: columns.clone(),
                rows: stats.rows,
            });
        }
        Ok(())
    }

    /// Replace the spec with `f(current)`. The new spec is checked against
    /// the source before it is installed. Fails while cached results pin the
    /// current spec and no clone is waiting to use the new one.
    pub(crate) fn respec(&self, f: impl FnOnce(&DatasetSpec) -> DatasetSpec) -> Result<SpecVersion> {
        let mut st = self.lock()?;
        if st.spec_pinned() {
            return Err(Error::SpecChangeWhileTriggered);
        }
        let spec = f(&st.spec.spec);
        let layout = Layout::resolve(&spec, self.exec.source.as_ref())?;
        layout.check_schema(self.root.context().schema())?;
        let next = Arc::new(st.spec.succeed(spec));
        #[cfg(feature = "tracing")]
        tracing::info!(
            binding = %self.id,
            from = %st.spec.version,
            to = %next.version,
            span = ?layout.span,
            "dataset respec"
        );
        st.spec = next;
        Ok(st.spec.version)
    }

    /// Lowered program and partition plan the next trigger would run.
    pub fn explain(&self) -> Result<String> {
        let st = self.lock()?;
        let pairs: Vec<_> = st.pending.iter().map(|a| (a.id, a.node.clone())).collect();
        let program = lower_actions(&pairs)?;
        let layout = Layout::resolve(&st.spec.spec, self.exec.source.as_ref())?;
        let policy = st
            .policy
            .clone()
            .unwrap_or(PartitionPolicy::Count(self.exec.cfg.npartitions));
        let partitions = plan_partitions(&layout.span, &policy)?;
        let mut s = format!(
            "{} spec {} span [{}, {})\npartitions:\n",
            self.id, st.spec.version, layout.span.start, layout.span.end
        );
        for p in &partitions {
            s.push_str(&format!("  {} [{}, {})\n", p.id.get(), p.range.start, p.range.end));
        }
        s.push_str(&program.explain());
        Ok(s)
    }
}
