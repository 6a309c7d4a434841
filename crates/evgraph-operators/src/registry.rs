//! Map action declarations to their operators.

use evgraph_core::action::ActionKind;

use crate::count::Count;
use crate::histo::Histo1D;
use crate::snapshot::Snapshot;
use crate::sum::Sum;
use crate::traits::ActionOperator;

pub fn make_operator(kind: &ActionKind) -> Box<dyn ActionOperator> {
    match kind {
        ActionKind::Count => Box::new(Count),
        ActionKind::Sum { column } => Box::new(Sum {
            column: column.clone(),
        }),
        ActionKind::Histo1D {
            model,
            column,
            weight,
        } => Box::new(Histo1D {
            model: model.clone(),
            column: column.clone(),
            weighted: weight.is_some(),
        }),
        ActionKind::Snapshot {
            output, columns, ..
        } => Box::new(Snapshot {
            output: output.clone(),
            columns: columns.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evgraph_core::action::SnapshotOptions;
    use evgraph_core::types::Scalar;

    #[test]
    fn snapshot_rows_follow_fill_order() {
        let kind = ActionKind::Snapshot {
            output: "out.jsonl".into(),
            columns: vec!["x".into(), "_entry".into()],
            options: SnapshotOptions::default(),
        };
        let op = make_operator(&kind);
        assert_eq!(op.name(), "snapshot");
        let mut acc = op.init();
        op.fill(&mut acc, &[Scalar::I64(7), Scalar::I64(0)]).unwrap();
        op.fill(&mut acc, &[Scalar::I64(9), Scalar::I64(3)]).unwrap();
        let evgraph_core::result::ActionResult::Rows(rows) = acc else {
            panic!("expected rows");
        };
        assert_eq!(rows.num_rows(), 2);
        assert_eq!(rows.column("_entry").unwrap().values[1], Scalar::I64(3));
    }

    #[test]
    fn count_ignores_values() {
        let op = make_operator(&ActionKind::Count);
        let mut acc = op.init();
        for _ in 0..3 {
            op.fill(&mut acc, &[]).unwrap();
        }
        assert_eq!(acc.as_count(), Some(3));
    }
}
