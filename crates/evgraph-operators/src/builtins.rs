//! Vector builtins: `sum`, `size`, `take`, `min`, `max`, `any`, `all`, `abs`, `sqrt`.

use std::sync::Arc;

use evgraph_core::error::{Error, Result};
use evgraph_core::schema::DataType;
use evgraph_core::types::Scalar;

use crate::functions::ScalarFunction;

pub(crate) fn all() -> Vec<Arc<dyn ScalarFunction>> {
    vec![
        Arc::new(Sum),
        Arc::new(Size),
        Arc::new(Take),
        Arc::new(Extremum { name: "min", max: false }),
        Arc::new(Extremum { name: "max", max: true }),
        Arc::new(Any { name: "any", all: false }),
        Arc::new(Any { name: "all", all: true }),
        Arc::new(Abs),
        Arc::new(Sqrt),
    ]
}

fn arity(name: &str, args: &[DataType], n: usize) -> Result<()> {
    if args.len() != n {
        return Err(Error::TypeMismatch(format!(
            "{}() takes {} argument(s), got {}",
            name,
            n,
            args.len()
        )));
    }
    Ok(())
}

fn want_vector(name: &str, t: DataType) -> Result<()> {
    if !t.is_vector() {
        return Err(Error::TypeMismatch(format!(
            "{}() expects a vector, got {}",
            name, t
        )));
    }
    Ok(())
}

fn bad_arg(name: &str, v: &Scalar) -> Error {
    Error::TypeMismatch(format!("{}() cannot take {:?}", name, v))
}

struct Sum;

impl ScalarFunction for Sum {
    fn name(&self) -> &str {
        "sum"
    }

    fn return_type(&self, args: &[DataType]) -> Result<DataType> {
        arity("sum", args, 1)?;
        want_vector("sum", args[0])?;
        Ok(match args[0] {
            DataType::Float64Vec => DataType::Float64,
            _ => DataType::Int64,
        })
    }

    fn invoke(&self, args: &[Scalar]) -> Result<Scalar> {
        match &args[0] {
            Scalar::BoolVec(v) => Ok(Scalar::I64(v.iter().filter(|b| **b).count() as i64)),
            Scalar::I64Vec(v) => Ok(Scalar::I64(v.iter().fold(0i64, |a, x| a.wrapping_add(*x)))),
            Scalar::F64Vec(v) => Ok(Scalar::F64(v.iter().sum())),
            Scalar::Null => Ok(Scalar::Null),
            other => Err(bad_arg("sum", other)),
        }
    }
}

struct Size;

impl ScalarFunction for Size {
    fn name(&self) -> &str {
        "size"
    }

    fn return_type(&self, args: &[DataType]) -> Result<DataType> {
        arity("size", args, 1)?;
        want_vector("size", args[0])?;
        Ok(DataType::Int64)
    }

    fn invoke(&self, args: &[Scalar]) -> Result<Scalar> {
        match &args[0] {
            Scalar::Null => Ok(Scalar::Null),
            v => v
                .vec_len()
                .map(|n| Scalar::I64(n as i64))
                .ok_or_else(|| bad_arg("size", v)),
        }
    }
}

/// `take(v, n)`: first `n` elements, or the last `|n|` when negative.
struct Take;

fn take_slice<T: Clone>(v: &[T], n: i64) -> Vec<T> {
    let k = (n.unsigned_abs() as usize).min(v.len());
    if n >= 0 {
        v[..k].to_vec()
    } else {
        v[v.len() - k..].to_vec()
    }
}

impl ScalarFunction for Take {
    fn name(&self) -> &str {
        "take"
    }

    fn return_type(&self, args: &[DataType]) -> Result<DataType> {
        arity("take", args, 2)?;
        want_vector("take", args[0])?;
        if args[1] != DataType::Int64 {
            return Err(Error::TypeMismatch(format!(
                "take() count must be Int64, got {}",
                args[1]
            )));
        }
        Ok(args[0])
    }

    fn invoke(&self, args: &[Scalar]) -> Result<Scalar> {
        let n = match &args[1] {
            Scalar::I64(n) => *n,
            Scalar::Null => return Ok(Scalar::Null),
            other => return Err(bad_arg("take", other)),
        };
        match &args[0] {
            Scalar::BoolVec(v) => Ok(Scalar::BoolVec(take_slice(v, n))),
            Scalar::I64Vec(v) => Ok(Scalar::I64Vec(take_slice(v, n))),
            Scalar::F64Vec(v) => Ok(Scalar::F64Vec(take_slice(v, n))),
            Scalar::Null => Ok(Scalar::Null),
            other => Err(bad_arg("take", other)),
        }
    }
}

/// `min(v)` / `max(v)`; null on an empty vector.
struct Extremum {
    name: &'static str,
    max: bool,
}

impl ScalarFunction for Extremum {
    fn name(&self) -> &str {
        self.name
    }

    fn return_type(&self, args: &[DataType]) -> Result<DataType> {
        arity(self.name, args, 1)?;
        want_vector(self.name, args[0])?;
        Ok(match args[0] {
            DataType::Float64Vec => DataType::Float64,
            _ => DataType::Int64,
        })
    }

    fn invoke(&self, args: &[Scalar]) -> Result<Scalar> {
        match &args[0] {
            Scalar::BoolVec(v) => Ok(pick_int(v.iter().map(|b| *b as i64), self.max)
                .map(Scalar::I64)
                .unwrap_or(Scalar::Null)),
            Scalar::I64Vec(v) => Ok(pick_int(v.iter().copied(), self.max)
                .map(Scalar::I64)
                .unwrap_or(Scalar::Null)),
            Scalar::F64Vec(v) => Ok(v
                .iter()
                .copied()
                .reduce(|a, b| if self.max { a.max(b) } else { a.min(b) })
                .map(Scalar::F64)
                .unwrap_or(Scalar::Null)),
            Scalar::Null => Ok(Scalar::Null),
            other => Err(bad_arg(self.name, other)),
        }
    }
}

fn pick_int(it: impl Iterator<Item = i64>, max: bool) -> Option<i64> {
    if max {
        it.max()
    } else {
        it.min()
    }
}

struct Any {
    name: &'static str,
    all: bool,
}

impl ScalarFunction for Any {
    fn name(&self) -> &str {
        self.name
    }

    fn return_type(&self, args: &[DataType]) -> Result<DataType> {
        arity(self.name, args, 1)?;
        if args[0] != DataType::BooleanVec {
            return Err(Error::TypeMismatch(format!(
                "{}() expects BooleanVec, got {}",
                self.name, args[0]
            )));
        }
        Ok(DataType::Boolean)
    }

    fn invoke(&self, args: &[Scalar]) -> Result<Scalar> {
        match &args[0] {
            Scalar::BoolVec(v) if self.all => Ok(Scalar::Bool(v.iter().all(|b| *b))),
            Scalar::BoolVec(v) => Ok(Scalar::Bool(v.iter().any(|b| *b))),
            Scalar::Null => Ok(Scalar::Null),
            other => Err(bad_arg(self.name, other)),
        }
    }
}

struct Abs;

impl ScalarFunction for Abs {
    fn name(&self) -> &str {
        "abs"
    }

    fn return_type(&self, args: &[DataType]) -> Result<DataType> {
        arity("abs", args, 1)?;
        match args[0] {
            DataType::Int64 | DataType::Float64 | DataType::Int64Vec | DataType::Float64Vec => {
                Ok(args[0])
            }
            other => Err(Error::TypeMismatch(format!("abs() cannot take {}", other))),
        }
    }

    fn invoke(&self, args: &[Scalar]) -> Result<Scalar> {
        match &args[0] {
            Scalar::I64(i) => Ok(Scalar::I64(i.wrapping_abs())),
            Scalar::F64(f) => Ok(Scalar::F64(f.abs())),
            Scalar::I64Vec(v) => Ok(Scalar::I64Vec(v.iter().map(|i| i.wrapping_abs()).collect())),
            Scalar::F64Vec(v) => Ok(Scalar::F64Vec(v.iter().map(|f| f.abs()).collect())),
            Scalar::Null => Ok(Scalar::Null),
            other => Err(bad_arg("abs", other)),
        }
    }
}

struct Sqrt;

impl ScalarFunction for Sqrt {
    fn name(&self) -> &str {
        "sqrt"
    }

    fn return_type(&self, args: &[DataType]) -> Result<DataType> {
        arity("sqrt", args, 1)?;
        match args[0] {
            t if t.is_vector() && t.element().is_numeric() => Ok(DataType::Float64Vec),
            t if t.is_numeric() => Ok(DataType::Float64),
            other => Err(Error::TypeMismatch(format!("sqrt() cannot take {}", other))),
        }
    }

    fn invoke(&self, args: &[Scalar]) -> Result<Scalar> {
        let v = &args[0];
        if v.is_null() {
            return Ok(Scalar::Null);
        }
        if let Some(x) = v.as_f64() {
            return Ok(Scalar::F64(x.sqrt()));
        }
        v.to_f64_vec()
            .map(|xs| Scalar::F64Vec(xs.into_iter().map(f64::sqrt).collect()))
            .ok_or_else(|| bad_arg("sqrt", v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::FunctionRegistry;

    fn call(name: &str, args: &[Scalar]) -> Scalar {
        FunctionRegistry::with_builtins()
            .get(name)
            .unwrap()
            .invoke(args)
            .unwrap()
    }

    #[test]
    fn sum_counts_true_mask_entries() {
        assert_eq!(call("sum", &[Scalar::BoolVec(vec![true, false, true])]), Scalar::I64(2));
        assert_eq!(call("sum", &[Scalar::F64Vec(vec![1.5, 2.5])]), Scalar::F64(4.0));
    }

    #[test]
    fn take_handles_negative_and_oversized_counts() {
        let v = Scalar::I64Vec(vec![1, 2, 3]);
        assert_eq!(call("take", &[v.clone(), Scalar::I64(2)]), Scalar::I64Vec(vec![1, 2]));
        assert_eq!(call("take", &[v.clone(), Scalar::I64(-1)]), Scalar::I64Vec(vec![3]));
        assert_eq!(call("take", &[v, Scalar::I64(10)]), Scalar::I64Vec(vec![1, 2, 3]));
    }

    #[test]
    fn extremum_of_empty_is_null() {
        assert_eq!(call("max", &[Scalar::F64Vec(vec![])]), Scalar::Null);
        assert_eq!(call("min", &[Scalar::F64Vec(vec![3.0, -1.0])]), Scalar::F64(-1.0));
    }

    #[test]
    fn size_rejects_scalars_at_declaration() {
        let reg = FunctionRegistry::with_builtins();
        let size = reg.get("size").unwrap();
        assert!(matches!(
            size.return_type(&[DataType::Float64]),
            Err(Error::TypeMismatch(_))
        ));
        assert_eq!(size.return_type(&[DataType::Float64Vec]).unwrap(), DataType::Int64);
    }
}
