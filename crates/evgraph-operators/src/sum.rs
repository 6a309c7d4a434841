//! Sum of a numeric column; vector columns contribute all their elements.

use evgraph_core::error::{Error, Result};
use evgraph_core::result::ActionResult;
use evgraph_core::schema::DataType;
use evgraph_core::types::Scalar;

use crate::traits::ActionOperator;

#[derive(Debug)]
pub struct Sum {
    pub column: String,
}

impl ActionOperator for Sum {
    fn name(&self) -> &'static str {
        "sum"
    }

    fn check(&self, inputs: &[DataType]) -> Result<()> {
        match inputs {
            [t] if t.element().is_numeric() => Ok(()),
            [t] => Err(Error::TypeMismatch(format!(
                "sum of '{}' needs a numeric column, got {}",
                self.column, t
            ))),
            _ => Err(Error::Invariant("sum takes exactly one column".into())),
        }
    }

    fn init(&self) -> ActionResult {
        ActionResult::Sum(0.0)
    }

    fn fill(&self, acc: &mut ActionResult, values: &[Scalar]) -> Result<()> {
        let ActionResult::Sum(total) = acc else {
            return Err(Error::Invariant(format!(
                "sum filled into {} accumulator",
                acc.kind_name()
            )));
        };
        match values.first() {
            None | Some(Scalar::Null) => {}
            Some(v) => {
                if let Some(x) = v.as_f64() {
                    *total += x;
                } else if let Some(xs) = v.to_f64_vec() {
                    *total += xs.iter().sum::<f64>();
                } else {
                    return Err(Error::TypeMismatch(format!(
                        "sum of '{}' got {:?}",
                        self.column, v
                    )));
                }
            }
        }
        Ok(())
    }
}
