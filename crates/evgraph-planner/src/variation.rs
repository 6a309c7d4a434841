//! Variation bookkeeping: tag sets and sensitivity.
//!
//! Every column value, filter and action carries the set of variant tags it
//! depends on. Under tag `t`, a value whose sensitivity does not contain `t`
//! is identical to its nominal value, so workers compute it once and share
//! it. Tags are linear: each tag switches on only its own Vary node's
//! alternative, every other Vary stays nominal.

use std::collections::BTreeSet;

use evgraph_core::error::{Error, Result};
use evgraph_core::expr::Expr;
use evgraph_core::result::NOMINAL;

use crate::graph::Scope;

pub type TagSet = BTreeSet<String>;

/// Validate the tags of a new Vary node against the tags already on its path.
pub fn check_new_tags(column: &str, exprs: usize, tags: &[String], upstream: &TagSet) -> Result<()> {
    if exprs != tags.len() {
        return Err(Error::TagArityMismatch {
            column: column.to_string(),
            expressions: exprs,
            tags: tags.len(),
        });
    }
    if tags.is_empty() {
        return Err(Error::Plan(format!(
            "vary on '{}' declares no alternatives",
            column
        )));
    }
    let mut seen = TagSet::new();
    for t in tags {
        if t.is_empty() {
            return Err(Error::Plan(format!("vary on '{}' has an empty tag", column)));
        }
        if t == NOMINAL || upstream.contains(t) || !seen.insert(t.clone()) {
            return Err(Error::DuplicateTag(t.clone()));
        }
    }
    Ok(())
}

/// Union of the sensitivities of the columns `expr` reads.
pub fn expr_sensitivity(expr: &Expr, scope: &Scope) -> TagSet {
    expr.columns()
        .iter()
        .filter_map(|c| scope.columns.get(c))
        .flat_map(|b| b.sens.iter().cloned())
        .collect()
}

/// The tag under which a value with sensitivity `sens` must be computed to
/// serve variant `tag`.
pub fn effective<'a>(tag: &'a str, sens: &TagSet) -> &'a str {
    if sens.contains(tag) {
        tag
    } else {
        NOMINAL
    }
}

/// Variant tags an action produces, nominal included.
pub fn variant_tags(path_tags: &TagSet, variations: bool) -> Vec<String> {
    let mut out = vec![NOMINAL.to_string()];
    if variations {
        out.extend(path_tags.iter().cloned());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn arity_is_checked_before_tags() {
        let err = check_new_tags("pt", 1, &tags(&["up", "down"]), &TagSet::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::TagArityMismatch {
                expressions: 1,
                tags: 2,
                ..
            }
        ));
    }

    #[test]
    fn collisions_are_duplicate_tags() {
        let upstream: TagSet = ["jes_up".to_string()].into();
        for bad in [&["jes_up"][..], &["a", "a"][..], &["nominal"][..]] {
            let err = check_new_tags("w", bad.len(), &tags(bad), &upstream).unwrap_err();
            assert!(matches!(err, Error::DuplicateTag(_)), "{:?}", bad);
        }
        assert!(check_new_tags("w", 2, &tags(&["btag_up", "btag_down"]), &upstream).is_ok());
    }

    #[test]
    fn effective_tag_falls_back_to_nominal() {
        let sens: TagSet = ["up".to_string()].into();
        assert_eq!(effective("up", &sens), "up");
        assert_eq!(effective("down", &sens), NOMINAL);
    }
}
