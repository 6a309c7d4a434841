//! Snapshot collects the selected rows of the listed columns. The scheduler
//! writes the merged rows to the sink after every partition has finished.

use evgraph_core::error::{Error, Result};
use evgraph_core::result::ActionResult;
use evgraph_core::schema::DataType;
use evgraph_core::types::{RowBatch, Scalar};

use crate::traits::ActionOperator;

#[derive(Debug)]
pub struct Snapshot {
    pub output: String,
    pub columns: Vec<String>,
}

impl ActionOperator for Snapshot {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    fn check(&self, inputs: &[DataType]) -> Result<()> {
        if self.columns.is_empty() {
            return Err(Error::Config(format!(
                "snapshot '{}' selects no columns",
                self.output
            )));
        }
        if inputs.len() != self.columns.len() {
            return Err(Error::Invariant(format!(
                "snapshot '{}' got {} types for {} columns",
                self.output,
                inputs.len(),
                self.columns.len()
            )));
        }
        Ok(())
    }

    fn init(&self) -> ActionResult {
        ActionResult::Rows(RowBatch::default())
    }

    fn fill(&self, acc: &mut ActionResult, values: &[Scalar]) -> Result<()> {
        let ActionResult::Rows(rows) = acc else {
            return Err(Error::Invariant(format!(
                "snapshot filled into {} accumulator",
                acc.kind_name()
            )));
        };
        rows.push_row(&self.columns, values.to_vec())
            .map_err(Error::Invariant)
    }
}
