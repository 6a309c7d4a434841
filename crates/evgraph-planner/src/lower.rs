//! Lower the pending actions of a binding into one executable `Program`.
//!
//! The program is the union of the action paths: every slot (column value)
//! and filter that some action needs appears exactly once, so a worker pass
//! evaluates shared prefixes once for all actions. Slots and filters are
//! keyed by id in `BTreeMap`s to keep the serialized form (and therefore
//! the program hash) deterministic.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use evgraph_core::action::ActionKind;
use evgraph_core::error::{Error, Result};
use evgraph_core::expr::Expr;
use evgraph_core::hash::{hash_serde, Hash256};
use evgraph_core::id::{ActionId, NodeId, SlotId};

use crate::graph::{GraphNode, NodeKind};
use crate::variation::{expr_sensitivity, TagSet};

/// An expression together with the slots its column names resolve to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundExpr {
    pub expr: Expr,
    pub bindings: BTreeMap<String, SlotId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SlotDef {
    /// Column read from the dataset.
    Dataset { column: String },
    /// Global logical entry number.
    Entry,
    Defined { expr: BoundExpr, sens: TagSet },
    /// `base` under nominal and foreign tags, an alternative under its own tags.
    Varied {
        base: SlotId,
        alternatives: BTreeMap<String, BoundExpr>,
        sens: TagSet,
    },
}

impl SlotDef {
    pub fn sens(&self) -> Option<&TagSet> {
        match self {
            SlotDef::Defined { sens, .. } | SlotDef::Varied { sens, .. } => Some(sens),
            SlotDef::Dataset { .. } | SlotDef::Entry => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDef {
    pub name: Option<String>,
    pub predicate: BoundExpr,
    pub sens: TagSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramAction {
    pub id: ActionId,
    pub node: NodeId,
    pub kind: ActionKind,
    /// Filter chain, root first.
    pub filters: Vec<NodeId>,
    /// Slots aligned with `kind.input_columns()`.
    pub inputs: Vec<SlotId>,
    /// Variant tags, nominal first.
    pub tags: Vec<String>,
    /// Tags whose result can differ from nominal.
    pub sens: TagSet,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub slots: BTreeMap<SlotId, SlotDef>,
    pub filters: BTreeMap<NodeId, FilterDef>,
    pub actions: Vec<ProgramAction>,
}

impl Program {
    /// Dataset columns the program reads.
    pub fn dataset_columns(&self) -> Vec<String> {
        let set: BTreeSet<&String> = self
            .slots
            .values()
            .filter_map(|s| match s {
                SlotDef::Dataset { column } => Some(column),
                _ => None,
            })
            .collect();
        set.into_iter().cloned().collect()
    }

    pub fn hash(&self) -> Result<Hash256> {
        hash_serde(self)
    }

    /// Human-readable listing for `explain`.
    pub fn explain(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "slots:");
        for (id, def) in &self.slots {
            let _ = match def {
                SlotDef::Dataset { column } => writeln!(s, "  {} = dataset.{}", id.get(), column),
                SlotDef::Entry => writeln!(s, "  {} = entry", id.get()),
                SlotDef::Defined { expr, sens } => {
                    writeln!(s, "  {} = {}  sens={:?}", id.get(), expr.expr, sens)
                }
                SlotDef::Varied {
                    base,
                    alternatives,
                    sens,
                } => {
                    let alts: Vec<String> = alternatives
                        .iter()
                        .map(|(t, e)| format!("{}: {}", t, e.expr))
                        .collect();
                    writeln!(
                        s,
                        "  {} = vary({}) [{}]  sens={:?}",
                        id.get(),
                        base.get(),
                        alts.join(", "),
                        sens
                    )
                }
            };
        }
        let _ = writeln!(s, "filters:");
        for (id, f) in &self.filters {
            let _ = writeln!(
                s,
                "  {} {}: {}  sens={:?}",
                id.get(),
                f.name.as_deref().unwrap_or("-"),
                f.predicate.expr,
                f.sens
            );
        }
        let _ = writeln!(s, "actions:");
        for a in &self.actions {
            let _ = writeln!(
                s,
                "  {} {} filters={:?} inputs={:?} tags={:?}",
                a.id.get(),
                a.kind.name(),
                a.filters.iter().map(|f| f.get()).collect::<Vec<_>>(),
                a.inputs.iter().map(|i| i.get()).collect::<Vec<_>>(),
                a.tags
            );
        }
        s
    }
}

/// Compile `(action id, action node)` pairs into one program.
pub fn lower_actions(actions: &[(ActionId, Arc<GraphNode>)]) -> Result<Program> {
    let mut program = Program::default();

    for (id, node) in actions {
        let NodeKind::Action { kind, .. } = &node.kind else {
            return Err(Error::Invariant(format!("{} is not an action node", node.id)));
        };
        let path = node.path();
        let mut filters = Vec::new();

        for n in &path {
            // Expressions bind against the scope visible above the node.
            let above = n.upstream.as_ref().map(|u| u.scope());
            match &n.kind {
                NodeKind::Source { columns, entry } => {
                    for (name, slot) in columns {
                        program.slots.entry(*slot).or_insert_with(|| SlotDef::Dataset {
                            column: name.clone(),
                        });
                    }
                    program.slots.entry(*entry).or_insert(SlotDef::Entry);
                }
                NodeKind::Define { expr, slot, .. } => {
                    let scope = above.ok_or_else(|| orphan(n))?;
                    program.slots.entry(*slot).or_insert_with(|| SlotDef::Defined {
                        expr: BoundExpr {
                            expr: expr.clone(),
                            bindings: scope.bindings(expr),
                        },
                        sens: expr_sensitivity(expr, scope),
                    });
                }
                NodeKind::Vary {
                    alternatives,
                    tags,
                    base,
                    slot,
                    column,
                } => {
                    let scope = above.ok_or_else(|| orphan(n))?;
                    let sens = n
                        .scope()
                        .columns
                        .get(column)
                        .map(|b| b.sens.clone())
                        .unwrap_or_default();
                    program.slots.entry(*slot).or_insert_with(|| SlotDef::Varied {
                        base: *base,
                        alternatives: tags
                            .iter()
                            .cloned()
                            .zip(alternatives.iter().map(|e| BoundExpr {
                                expr: e.clone(),
                                bindings: scope.bindings(e),
                            }))
                            .collect(),
                        sens,
                    });
                }
                NodeKind::Filter { predicate, name } => {
                    let scope = above.ok_or_else(|| orphan(n))?;
                    program.filters.entry(n.id).or_insert_with(|| FilterDef {
                        name: name.clone(),
                        predicate: BoundExpr {
                            expr: predicate.clone(),
                            bindings: scope.bindings(predicate),
                        },
                        sens: expr_sensitivity(predicate, scope),
                    });
                    filters.push(n.id);
                }
                NodeKind::Action { .. } => {}
            }
        }

        let inputs = kind
            .input_columns()
            .iter()
            .map(|c| {
                node.scope()
                    .columns
                    .get(c)
                    .map(|b| b.slot)
                    .ok_or_else(|| Error::UndefinedColumn(c.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        program.actions.push(ProgramAction {
            id: *id,
            node: node.id,
            kind: kind.clone(),
            filters,
            inputs,
            tags: node.variant_tags(),
            sens: node.action_sensitivity(),
        });
    }

    prune_unused_slots(&mut program);
    Ok(program)
}

fn orphan(n: &GraphNode) -> Error {
    Error::Invariant(format!("{} node {} has no upstream", n.kind.label(), n.id))
}

/// Drop slots no filter or action reaches; keeps reads to what is needed.
fn prune_unused_slots(program: &mut Program) {
    let mut live: BTreeSet<SlotId> = BTreeSet::new();
    let mut stack: Vec<SlotId> = program
        .actions
        .iter()
        .flat_map(|a| a.inputs.iter().copied())
        .chain(
            program
                .filters
                .values()
                .flat_map(|f| f.predicate.bindings.values().copied()),
        )
        .collect();

    while let Some(slot) = stack.pop() {
        if !live.insert(slot) {
            continue;
        }
        match program.slots.get(&slot) {
            Some(SlotDef::Defined { expr, .. }) => stack.extend(expr.bindings.values().copied()),
            Some(SlotDef::Varied {
                base, alternatives, ..
            }) => {
                stack.push(*base);
                for alt in alternatives.values() {
                    stack.extend(alt.bindings.values().copied());
                }
            }
            _ => {}
        }
    }
    program.slots.retain(|id, _| live.contains(id));
}
