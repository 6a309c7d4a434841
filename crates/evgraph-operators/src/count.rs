use evgraph_core::error::{Error, Result};
use evgraph_core::result::ActionResult;
use evgraph_core::schema::DataType;
use evgraph_core::types::Scalar;

use crate::traits::ActionOperator;

#[derive(Debug, Default)]
pub struct Count;

impl ActionOperator for Count {
    fn name(&self) -> &'static str {
        "count"
    }

    fn check(&self, _inputs: &[DataType]) -> Result<()> {
        Ok(())
    }

    fn init(&self) -> ActionResult {
        ActionResult::Count(0)
    }

    fn fill(&self, acc: &mut ActionResult, _values: &[Scalar]) -> Result<()> {
        match acc {
            ActionResult::Count(n) => {
                *n += 1;
                Ok(())
            }
            other => Err(Error::Invariant(format!(
                "count filled into {} accumulator",
                other.kind_name()
            ))),
        }
    }
}
