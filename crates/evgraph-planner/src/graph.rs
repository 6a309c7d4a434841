//! Graph Node Model.
//!
//! Nodes are immutable and reference-counted. Every builder call validates
//! eagerly and returns a new node whose single upstream is the receiver, so
//! one node can feed any number of independent downstream paths.
//!
//! Each node carries the `Scope` visible below it: the columns (with the
//! slot that computes them, their type and their tag sensitivity), the
//! variant tags introduced on the path, and the sensitivity of the filter
//! chain. Node ids grow monotonically, so sorting by id is a topological
//! order.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use evgraph_core::action::ActionKind;
use evgraph_core::error::{Error, Result};
use evgraph_core::expr::Expr;
use evgraph_core::id::{NodeId, SlotId};
use evgraph_core::schema::{DataType, Schema};
use evgraph_core::ENTRY_COLUMN;
use evgraph_operators::{infer_type, make_operator, FunctionRegistry};

use crate::variation::{check_new_tags, expr_sensitivity, variant_tags, TagSet};

/// Shared by every node of one graph.
pub struct GraphContext {
    schema: Schema,
    functions: Arc<FunctionRegistry>,
    next_node: AtomicU64,
    next_slot: AtomicU64,
}

impl fmt::Debug for GraphContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphContext")
            .field("schema", &self.schema.names())
            .finish()
    }
}

impl GraphContext {
    pub fn new(schema: Schema, functions: Arc<FunctionRegistry>) -> Arc<Self> {
        Arc::new(Self {
            schema,
            functions,
            next_node: AtomicU64::new(0),
            next_slot: AtomicU64::new(0),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn functions(&self) -> &Arc<FunctionRegistry> {
        &self.functions
    }

    fn node_id(&self) -> NodeId {
        NodeId::new(self.next_node.fetch_add(1, Ordering::Relaxed))
    }

    fn slot_id(&self) -> SlotId {
        SlotId::new(self.next_slot.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnBinding {
    pub slot: SlotId,
    pub dtype: DataType,
    /// Variant tags this column's value depends on.
    pub sens: TagSet,
}

#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub columns: BTreeMap<String, ColumnBinding>,
    /// Tags introduced by Vary nodes on the path.
    pub tags: TagSet,
    /// Tags the filter chain depends on.
    pub selection: TagSet,
}

impl Scope {
    pub fn dtype(&self, name: &str) -> Option<DataType> {
        self.columns.get(name).map(|b| b.dtype)
    }

    fn infer(&self, expr: &Expr, functions: &FunctionRegistry) -> Result<DataType> {
        infer_type(expr, &|n: &str| self.dtype(n), functions)
    }

    /// Column name to slot for every column `expr` reads.
    pub fn bindings(&self, expr: &Expr) -> BTreeMap<String, SlotId> {
        expr.columns()
            .into_iter()
            .filter_map(|c| self.columns.get(&c).map(|b| (c, b.slot)))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Source {
        /// Dataset column name to the slot reading it.
        columns: BTreeMap<String, SlotId>,
        entry: SlotId,
    },
    Define {
        name: String,
        expr: Expr,
        slot: SlotId,
    },
    Filter {
        predicate: Expr,
        name: Option<String>,
    },
    Vary {
        column: String,
        alternatives: Vec<Expr>,
        tags: Vec<String>,
        /// Slot holding the nominal value.
        base: SlotId,
        slot: SlotId,
    },
    Action {
        kind: ActionKind,
        variations: bool,
    },
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Source { .. } => "source",
            NodeKind::Define { .. } => "define",
            NodeKind::Filter { .. } => "filter",
            NodeKind::Vary { .. } => "vary",
            NodeKind::Action { .. } => "action",
        }
    }
}

pub struct GraphNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub upstream: Option<Arc<GraphNode>>,
    scope: Arc<Scope>,
    ctx: Arc<GraphContext>,
}

impl fmt::Debug for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphNode")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("upstream", &self.upstream.as_ref().map(|u| u.id))
            .finish()
    }
}

impl GraphNode {
    /// Root node exposing the dataset schema plus the implicit entry column.
    pub fn source(ctx: Arc<GraphContext>) -> Arc<GraphNode> {
        let mut scope = Scope::default();
        let mut columns = BTreeMap::new();
        for field in &ctx.schema().fields {
            if field.name == ENTRY_COLUMN {
                continue;
            }
            let slot = ctx.slot_id();
            columns.insert(field.name.clone(), slot);
            scope.columns.insert(
                field.name.clone(),
                ColumnBinding {
                    slot,
                    dtype: field.data_type,
                    sens: TagSet::new(),
                },
            );
        }
        let entry = ctx.slot_id();
        scope.columns.insert(
            ENTRY_COLUMN.to_string(),
            ColumnBinding {
                slot: entry,
                dtype: DataType::Int64,
                sens: TagSet::new(),
            },
        );
        Arc::new(GraphNode {
            id: ctx.node_id(),
            kind: NodeKind::Source { columns, entry },
            upstream: None,
            scope: Arc::new(scope),
            ctx,
        })
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn context(&self) -> &Arc<GraphContext> {
        &self.ctx
    }

    pub fn column_type(&self, name: &str) -> Option<DataType> {
        self.scope.dtype(name)
    }

    /// Visible column names, sorted.
    pub fn column_names(&self) -> Vec<String> {
        self.scope.columns.keys().cloned().collect()
    }

    /// Nodes from the root down to `self`.
    pub fn path(self: &Arc<Self>) -> Vec<Arc<GraphNode>> {
        let mut out = vec![self.clone()];
        let mut cur = self.upstream.clone();
        while let Some(n) = cur {
            cur = n.upstream.clone();
            out.push(n);
        }
        out.reverse();
        out
    }

    pub fn root(self: &Arc<Self>) -> Arc<GraphNode> {
        let mut cur = self.clone();
        while let Some(up) = cur.upstream.clone() {
            cur = up;
        }
        cur
    }

    pub fn is_action(&self) -> bool {
        matches!(self.kind, NodeKind::Action { .. })
    }

    /// Variant tags produced by an action node; empty for other nodes.
    pub fn variant_tags(&self) -> Vec<String> {
        match &self.kind {
            NodeKind::Action { variations, .. } => variant_tags(&self.scope.tags, *variations),
            _ => vec![],
        }
    }

    fn child(self: &Arc<Self>, kind: NodeKind, scope: Scope) -> Arc<GraphNode> {
        Arc::new(GraphNode {
            id: self.ctx.node_id(),
            kind,
            upstream: Some(self.clone()),
            scope: Arc::new(scope),
            ctx: self.ctx.clone(),
        })
    }

    fn ensure_open(&self, what: &str) -> Result<()> {
        if self.is_action() {
            return Err(Error::Plan(format!(
                "cannot {} below action node {}",
                what, self.id
            )));
        }
        Ok(())
    }

    pub fn define(self: &Arc<Self>, name: &str, expr: Expr) -> Result<Arc<GraphNode>> {
        self.ensure_open("define")?;
        if name.is_empty() {
            return Err(Error::Plan("define needs a column name".into()));
        }
        if self.scope.columns.contains_key(name) {
            return Err(Error::ColumnExists(name.to_string()));
        }
        let dtype = self.scope.infer(&expr, self.ctx.functions())?;
        let slot = self.ctx.slot_id();
        let mut scope = (*self.scope).clone();
        scope.columns.insert(
            name.to_string(),
            ColumnBinding {
                slot,
                dtype,
                sens: expr_sensitivity(&expr, &self.scope),
            },
        );
        Ok(self.child(
            NodeKind::Define {
                name: name.to_string(),
                expr,
                slot,
            },
            scope,
        ))
    }

    pub fn filter(self: &Arc<Self>, predicate: Expr, name: Option<String>) -> Result<Arc<GraphNode>> {
        self.ensure_open("filter")?;
        let dtype = self.scope.infer(&predicate, self.ctx.functions())?;
        if dtype != DataType::Boolean {
            return Err(Error::TypeMismatch(format!(
                "filter predicate {} has type {}, expected bool",
                predicate, dtype
            )));
        }
        let mut scope = (*self.scope).clone();
        scope.selection.extend(expr_sensitivity(&predicate, &self.scope));
        Ok(self.child(NodeKind::Filter { predicate, name }, scope))
    }

    /// Declare alternative definitions of `column`, one per tag.
    pub fn vary(
        self: &Arc<Self>,
        column: &str,
        alternatives: Vec<Expr>,
        tags: Vec<String>,
    ) -> Result<Arc<GraphNode>> {
        self.ensure_open("vary")?;
        check_new_tags(column, alternatives.len(), &tags, &self.scope.tags)?;
        let base = self
            .scope
            .columns
            .get(column)
            .ok_or_else(|| Error::UndefinedColumn(column.to_string()))?
            .clone();
        if column == ENTRY_COLUMN {
            return Err(Error::Plan(format!("cannot vary '{}'", ENTRY_COLUMN)));
        }
        for (alt, tag) in alternatives.iter().zip(&tags) {
            let t = self.scope.infer(alt, self.ctx.functions())?;
            if t != base.dtype {
                return Err(Error::TypeMismatch(format!(
                    "variation '{}' of '{}' has type {}, column has {}",
                    tag, column, t, base.dtype
                )));
            }
        }

        let slot = self.ctx.slot_id();
        let mut sens = base.sens.clone();
        sens.extend(tags.iter().cloned());
        let mut scope = (*self.scope).clone();
        scope.tags.extend(tags.iter().cloned());
        scope.columns.insert(
            column.to_string(),
            ColumnBinding {
                slot,
                dtype: base.dtype,
                sens,
            },
        );
        Ok(self.child(
            NodeKind::Vary {
                column: column.to_string(),
                alternatives,
                tags,
                base: base.slot,
                slot,
            },
            scope,
        ))
    }

    /// Declare a terminal action. Snapshot with no columns selects every
    /// visible column except the entry number.
    pub fn action(self: &Arc<Self>, mut kind: ActionKind, variations: bool) -> Result<Arc<GraphNode>> {
        self.ensure_open("add an action")?;
        if let ActionKind::Snapshot { columns, .. } = &mut kind {
            if columns.is_empty() {
                *columns = self
                    .scope
                    .columns
                    .keys()
                    .filter(|c| c.as_str() != ENTRY_COLUMN)
                    .cloned()
                    .collect();
            }
        }
        let types = kind
            .input_columns()
            .iter()
            .map(|c| {
                self.scope
                    .dtype(c)
                    .ok_or_else(|| Error::UndefinedColumn(c.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        make_operator(&kind).check(&types)?;
        Ok(self.child(
            NodeKind::Action { kind, variations },
            (*self.scope).clone(),
        ))
    }

    /// Tags the action's result depends on: its filter chain plus its inputs.
    pub fn action_sensitivity(&self) -> TagSet {
        let mut sens = self.scope.selection.clone();
        if let NodeKind::Action { kind, .. } = &self.kind {
            for c in kind.input_columns() {
                if let Some(b) = self.scope.columns.get(&c) {
                    sens.extend(b.sens.iter().cloned());
                }
            }
        }
        sens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evgraph_core::action::HistoModel;
    use evgraph_core::expr::{col, lit};
    use evgraph_core::schema::Field;

    fn root() -> Arc<GraphNode> {
        let schema = Schema::new(vec![
            Field::new("x", DataType::Float64, false),
            Field::new("w", DataType::Float64, false),
            Field::new("jet_pt", DataType::Float64Vec, false),
        ]);
        GraphNode::source(GraphContext::new(
            schema,
            Arc::new(FunctionRegistry::with_builtins()),
        ))
    }

    fn strs(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn builders_never_touch_the_receiver() {
        let r = root();
        let a = r.define("y", col("x").mul(lit(2.0))).unwrap();
        let b = r.filter(col("x").gt(lit(1.0)), None).unwrap();
        assert!(r.column_type("y").is_none());
        assert_eq!(a.column_type("y"), Some(DataType::Float64));
        assert!(b.column_type("y").is_none());
        assert!(a.id < b.id);
        assert_eq!(a.path().len(), 2);
        assert_eq!(b.root().id, r.id);
    }

    #[test]
    fn declaration_errors_are_eager() {
        let r = root();
        assert!(matches!(
            r.define("y", col("nope")),
            Err(Error::UndefinedColumn(_))
        ));
        assert!(matches!(
            r.define("x", lit(1i64)),
            Err(Error::ColumnExists(_))
        ));
        assert!(matches!(
            r.filter(col("x").add(lit(1.0)), None),
            Err(Error::TypeMismatch(_))
        ));
        assert!(matches!(
            r.filter(col("jet_pt").gt(lit(1.0)), None),
            Err(Error::TypeMismatch(_))
        ));
        assert!(matches!(
            r.define("s", evgraph_core::expr::call("scale", vec![col("x")])),
            Err(Error::UndefinedFunction(_))
        ));
    }

    #[test]
    fn vary_tracks_tags_and_sensitivity() {
        let r = root();
        let v = r
            .vary(
                "x",
                vec![col("x").mul(lit(0.9)), col("x").mul(lit(1.1))],
                strs(&["down", "up"]),
            )
            .unwrap();
        let d = v.define("x2", col("x").mul(lit(2.0))).unwrap();
        let plain = d.define("w2", col("w").mul(lit(2.0))).unwrap();
        assert_eq!(
            plain.scope().columns["x2"].sens,
            TagSet::from(["down".to_string(), "up".to_string()])
        );
        assert!(plain.scope().columns["w2"].sens.is_empty());

        let err = plain
            .vary("w", vec![col("w")], strs(&["up"]))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateTag(t) if t == "up"));

        let err = plain
            .vary("w", vec![col("w")], strs(&["a", "b"]))
            .unwrap_err();
        assert!(matches!(err, Error::TagArityMismatch { .. }));

        let err = plain
            .vary("w", vec![lit(1i64)], strs(&["one"]))
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch(_)));
    }

    #[test]
    fn actions_are_terminal_and_checked() {
        let r = root();
        let h = r
            .action(
                ActionKind::Histo1D {
                    model: HistoModel::new("h", 10, 0.0, 10.0),
                    column: "x".into(),
                    weight: Some("w".into()),
                },
                true,
            )
            .unwrap();
        assert!(h.define("z", lit(1i64)).is_err());
        assert_eq!(h.variant_tags(), vec!["nominal".to_string()]);

        let bad = r.action(
            ActionKind::Sum {
                column: "missing".into(),
            },
            false,
        );
        assert!(matches!(bad, Err(Error::UndefinedColumn(_))));

        let snap = r
            .action(
                ActionKind::Snapshot {
                    output: "o".into(),
                    columns: vec![],
                    options: Default::default(),
                },
                false,
            )
            .unwrap();
        match &snap.kind {
            NodeKind::Action {
                kind: ActionKind::Snapshot { columns, .. },
                ..
            } => assert_eq!(columns, &strs(&["jet_pt", "w", "x"])),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn selection_sensitivity_flows_into_actions() {
        let r = root();
        let v = r
            .vary("x", vec![col("x").add(lit(1.0))], strs(&["shift"]))
            .unwrap();
        let f = v.filter(col("x").gt(lit(25.0)), None).unwrap();
        let c = f.action(ActionKind::Count, true).unwrap();
        assert_eq!(c.action_sensitivity(), TagSet::from(["shift".to_string()]));
        assert_eq!(c.variant_tags(), strs(&["nominal", "shift"]));
    }
}
