//! One-dimensional histogram fill.
//!
//! A scalar value fills once. A vector value fills once per element, with
//! either a scalar weight applied to every element or a weight vector of the
//! same length. Null values are skipped.

use evgraph_core::action::HistoModel;
use evgraph_core::error::{Error, Result};
use evgraph_core::histogram::Histogram1D;
use evgraph_core::result::ActionResult;
use evgraph_core::schema::DataType;
use evgraph_core::types::Scalar;

use crate::traits::ActionOperator;

#[derive(Debug)]
pub struct Histo1D {
    pub model: HistoModel,
    pub column: String,
    pub weighted: bool,
}

impl Histo1D {
    fn weights(&self, value_len: Option<usize>, weight: Option<&Scalar>) -> Result<Weights> {
        let Some(w) = weight else {
            return Ok(Weights::Uniform(1.0));
        };
        if let Some(x) = w.as_f64() {
            return Ok(Weights::Uniform(x));
        }
        match (value_len, w.to_f64_vec()) {
            (Some(n), Some(ws)) if ws.len() == n => Ok(Weights::PerElement(ws)),
            (Some(n), Some(ws)) => Err(Error::TypeMismatch(format!(
                "histogram '{}': {} weights for {} values",
                self.model.name,
                ws.len(),
                n
            ))),
            _ => Err(Error::TypeMismatch(format!(
                "histogram '{}': unusable weight {:?}",
                self.model.name, w
            ))),
        }
    }
}

enum Weights {
    Uniform(f64),
    PerElement(Vec<f64>),
}

impl ActionOperator for Histo1D {
    fn name(&self) -> &'static str {
        "histo1d"
    }

    fn check(&self, inputs: &[DataType]) -> Result<()> {
        if self.model.nbins == 0 {
            return Err(Error::Config(format!(
                "histogram '{}' needs at least one bin",
                self.model.name
            )));
        }
        if !(self.model.low < self.model.high) {
            return Err(Error::Config(format!(
                "histogram '{}' range [{}, {}) is empty",
                self.model.name, self.model.low, self.model.high
            )));
        }
        let value = inputs
            .first()
            .ok_or_else(|| Error::Invariant("histo1d needs a value column".into()))?;
        if !value.element().is_numeric() {
            return Err(Error::TypeMismatch(format!(
                "histogram '{}' cannot fill '{}' of type {}",
                self.model.name, self.column, value
            )));
        }
        if let Some(w) = inputs.get(1) {
            if !w.element().is_numeric() || (w.is_vector() && !value.is_vector()) {
                return Err(Error::TypeMismatch(format!(
                    "histogram '{}' weight of type {} does not fit value type {}",
                    self.model.name, w, value
                )));
            }
        }
        Ok(())
    }

    fn init(&self) -> ActionResult {
        ActionResult::Histogram(Histogram1D::new(self.model.clone()))
    }

    fn fill(&self, acc: &mut ActionResult, values: &[Scalar]) -> Result<()> {
        let ActionResult::Histogram(h) = acc else {
            return Err(Error::Invariant(format!(
                "histo1d filled into {} accumulator",
                acc.kind_name()
            )));
        };
        let value = match values.first() {
            None | Some(Scalar::Null) => return Ok(()),
            Some(v) => v,
        };
        let weight = if self.weighted {
            match values.get(1) {
                Some(Scalar::Null) => return Ok(()),
                w => w,
            }
        } else {
            None
        };

        if let Some(x) = value.as_f64() {
            return match self.weights(None, weight)? {
                Weights::Uniform(w) => {
                    h.fill(x, w);
                    Ok(())
                }
                Weights::PerElement(_) => Err(Error::TypeMismatch(format!(
                    "histogram '{}': weight vector for a scalar value",
                    self.model.name
                ))),
            };
        }
        let xs = value.to_f64_vec().ok_or_else(|| {
            Error::TypeMismatch(format!(
                "histogram '{}' cannot fill {:?}",
                self.model.name, value
            ))
        })?;
        match self.weights(Some(xs.len()), weight)? {
            Weights::Uniform(w) => xs.iter().for_each(|x| h.fill(*x, w)),
            Weights::PerElement(ws) => xs.iter().zip(&ws).for_each(|(x, w)| h.fill(*x, *w)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(weighted: bool) -> Histo1D {
        Histo1D {
            model: HistoModel::new("h", 4, 0.0, 4.0),
            column: "x".into(),
            weighted,
        }
    }

    #[test]
    fn vector_values_fill_each_element() {
        let op = op(true);
        let mut acc = op.init();
        op.fill(&mut acc, &[Scalar::F64Vec(vec![0.5, 1.5]), Scalar::F64(2.0)])
            .unwrap();
        op.fill(
            &mut acc,
            &[Scalar::I64Vec(vec![3, 9]), Scalar::F64Vec(vec![0.5, 1.0])],
        )
        .unwrap();
        let h = acc.as_histogram().unwrap();
        assert_eq!(h.bin_content(1), 2.0);
        assert_eq!(h.bin_content(2), 2.0);
        assert_eq!(h.bin_content(4), 0.5);
        assert_eq!(h.overflow(), 1.0);
    }

    #[test]
    fn weight_length_must_match() {
        let op = op(true);
        let mut acc = op.init();
        let err = op
            .fill(&mut acc, &[Scalar::F64Vec(vec![1.0]), Scalar::F64Vec(vec![1.0, 2.0])])
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch(_)));
    }

    #[test]
    fn declaration_checks() {
        let mut bad = op(false);
        bad.model.nbins = 0;
        assert!(bad.check(&[DataType::Float64]).is_err());
        assert!(op(false).check(&[DataType::Utf8]).is_err());
        assert!(op(true)
            .check(&[DataType::Float64, DataType::Float64Vec])
            .is_err());
        assert!(op(true)
            .check(&[DataType::Float64Vec, DataType::Float64])
            .is_ok());
    }
}
