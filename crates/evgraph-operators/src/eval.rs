//! Row-wise expression evaluation and static type inference.
//!
//! Typing rules, shared by `infer_type` (declaration time) and `evaluate`
//! (pass time) so both always agree:
//! - arithmetic on integers/booleans stays `Int64`, except `/` which is `Float64`;
//!   any `Float64` operand makes the result `Float64`
//! - comparisons yield `Boolean`; logical operators take only booleans
//! - a vector combined with a scalar applies elementwise, two vectors must
//!   have equal length at run time
//! - `Null` propagates through operators and calls and never passes a filter

use std::cmp::Ordering;

use evgraph_core::error::{Error, Result};
use evgraph_core::expr::{BinaryOp, Expr, UnaryOp};
use evgraph_core::schema::DataType;
use evgraph_core::types::Scalar;

use crate::functions::FunctionRegistry;

/// Column values of the row being evaluated.
pub trait RowContext {
    fn column(&mut self, name: &str) -> Result<Scalar>;
}

impl<F> RowContext for F
where
    F: FnMut(&str) -> Result<Scalar>,
{
    fn column(&mut self, name: &str) -> Result<Scalar> {
        self(name)
    }
}

pub fn evaluate(
    expr: &Expr,
    row: &mut dyn RowContext,
    functions: &FunctionRegistry,
) -> Result<Scalar> {
    match expr {
        Expr::Column(name) => row.column(name),
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Unary { op, expr } => eval_unary(*op, evaluate(expr, row, functions)?),
        Expr::Binary { left, op, right } => {
            let l = evaluate(left, row, functions)?;
            // Scalar && / || short-circuit; the right side may be expensive.
            match (op, &l) {
                (BinaryOp::And, Scalar::Bool(false)) => return Ok(Scalar::Bool(false)),
                (BinaryOp::Or, Scalar::Bool(true)) => return Ok(Scalar::Bool(true)),
                _ => {}
            }
            let r = evaluate(right, row, functions)?;
            eval_binary(*op, l, r)
        }
        Expr::Call { name, args } => {
            let f = functions.get(name)?;
            let values = args
                .iter()
                .map(|a| evaluate(a, row, functions))
                .collect::<Result<Vec<_>>>()?;
            f.invoke(&values)
        }
        Expr::Mask { input, mask } => {
            let v = evaluate(input, row, functions)?;
            let m = evaluate(mask, row, functions)?;
            apply_mask(v, m)
        }
    }
}

/// Static result type of `expr`; `lookup` resolves column names.
pub fn infer_type(
    expr: &Expr,
    lookup: &dyn Fn(&str) -> Option<DataType>,
    functions: &FunctionRegistry,
) -> Result<DataType> {
    match expr {
        Expr::Column(name) => lookup(name).ok_or_else(|| Error::UndefinedColumn(name.clone())),
        Expr::Literal(v) => v
            .data_type()
            .ok_or_else(|| Error::TypeMismatch("null literal has no type".into())),
        Expr::Unary { op, expr } => unary_type(*op, infer_type(expr, lookup, functions)?),
        Expr::Binary { left, op, right } => binary_type(
            *op,
            infer_type(left, lookup, functions)?,
            infer_type(right, lookup, functions)?,
        ),
        Expr::Call { name, args } => {
            let f = functions.get(name)?;
            let types = args
                .iter()
                .map(|a| infer_type(a, lookup, functions))
                .collect::<Result<Vec<_>>>()?;
            f.return_type(&types)
        }
        Expr::Mask { input, mask } => mask_type(
            infer_type(input, lookup, functions)?,
            infer_type(mask, lookup, functions)?,
        ),
    }
}

pub fn binary_type(op: BinaryOp, l: DataType, r: DataType) -> Result<DataType> {
    let mismatch = || {
        Error::TypeMismatch(format!(
            "operator {} cannot combine {} and {}",
            op.symbol(),
            l,
            r
        ))
    };
    if l == DataType::Utf8 || r == DataType::Utf8 {
        return if l == r && op.is_comparison() {
            Ok(DataType::Boolean)
        } else {
            Err(mismatch())
        };
    }
    let (le, re) = (l.element(), r.element());
    let elem = if op.is_logical() {
        if le != DataType::Boolean || re != DataType::Boolean {
            return Err(mismatch());
        }
        DataType::Boolean
    } else if op.is_comparison() {
        DataType::Boolean
    } else if op == BinaryOp::Div || le == DataType::Float64 || re == DataType::Float64 {
        DataType::Float64
    } else {
        DataType::Int64
    };
    if l.is_vector() || r.is_vector() {
        elem.vector_of().ok_or_else(mismatch)
    } else {
        Ok(elem)
    }
}

pub fn unary_type(op: UnaryOp, t: DataType) -> Result<DataType> {
    match (op, t.element()) {
        (UnaryOp::Not, DataType::Boolean) => Ok(t),
        (UnaryOp::Neg, DataType::Boolean) => Ok(if t.is_vector() {
            DataType::Int64Vec
        } else {
            DataType::Int64
        }),
        (UnaryOp::Neg, DataType::Int64 | DataType::Float64) => Ok(t),
        _ => Err(Error::TypeMismatch(format!("{:?} cannot apply to {}", op, t))),
    }
}

pub fn mask_type(input: DataType, mask: DataType) -> Result<DataType> {
    if !input.is_vector() {
        return Err(Error::TypeMismatch(format!("cannot mask non-vector {}", input)));
    }
    if !matches!(mask, DataType::BooleanVec | DataType::Int64Vec) {
        return Err(Error::TypeMismatch(format!(
            "mask must be vec<bool> or vec<i64>, got {}",
            mask
        )));
    }
    Ok(input)
}

#[derive(Debug, Clone, Copy)]
enum Num {
    B(bool),
    I(i64),
    F(f64),
}

impl Num {
    fn i(self) -> i64 {
        match self {
            Num::B(b) => b as i64,
            Num::I(i) => i,
            Num::F(f) => f as i64,
        }
    }

    fn f(self) -> f64 {
        match self {
            Num::B(b) => b as i64 as f64,
            Num::I(i) => i as f64,
            Num::F(f) => f,
        }
    }

    fn truthy(self) -> bool {
        match self {
            Num::B(b) => b,
            Num::I(i) => i != 0,
            Num::F(f) => f != 0.0,
        }
    }

    fn is_float(self) -> bool {
        matches!(self, Num::F(_))
    }

    fn into_scalar(self) -> Scalar {
        match self {
            Num::B(b) => Scalar::Bool(b),
            Num::I(i) => Scalar::I64(i),
            Num::F(f) => Scalar::F64(f),
        }
    }
}

enum Lane {
    One(Num),
    Many(Vec<Num>),
}

fn lane(v: &Scalar) -> Option<Lane> {
    Some(match v {
        Scalar::Bool(b) => Lane::One(Num::B(*b)),
        Scalar::I64(i) => Lane::One(Num::I(*i)),
        Scalar::F64(f) => Lane::One(Num::F(*f)),
        Scalar::BoolVec(v) => Lane::Many(v.iter().map(|b| Num::B(*b)).collect()),
        Scalar::I64Vec(v) => Lane::Many(v.iter().map(|i| Num::I(*i)).collect()),
        Scalar::F64Vec(v) => Lane::Many(v.iter().map(|f| Num::F(*f)).collect()),
        Scalar::Null | Scalar::Str(_) => return None,
    })
}

fn pack(elem: DataType, values: Vec<Num>) -> Scalar {
    match elem {
        DataType::Boolean => Scalar::BoolVec(values.into_iter().map(Num::truthy).collect()),
        DataType::Int64 => Scalar::I64Vec(values.into_iter().map(Num::i).collect()),
        _ => Scalar::F64Vec(values.into_iter().map(Num::f).collect()),
    }
}

fn apply(op: BinaryOp, a: Num, b: Num, elem: DataType) -> Num {
    let ints = !a.is_float() && !b.is_float();
    let ord = || {
        if ints {
            Some(a.i().cmp(&b.i()))
        } else {
            a.f().partial_cmp(&b.f())
        }
    };
    match op {
        BinaryOp::Add if elem == DataType::Int64 => Num::I(a.i().wrapping_add(b.i())),
        BinaryOp::Sub if elem == DataType::Int64 => Num::I(a.i().wrapping_sub(b.i())),
        BinaryOp::Mul if elem == DataType::Int64 => Num::I(a.i().wrapping_mul(b.i())),
        BinaryOp::Add => Num::F(a.f() + b.f()),
        BinaryOp::Sub => Num::F(a.f() - b.f()),
        BinaryOp::Mul => Num::F(a.f() * b.f()),
        BinaryOp::Div => Num::F(a.f() / b.f()),
        BinaryOp::Eq => Num::B(ord() == Some(Ordering::Equal)),
        BinaryOp::NotEq => Num::B(ord() != Some(Ordering::Equal)),
        BinaryOp::Lt => Num::B(ord() == Some(Ordering::Less)),
        BinaryOp::LtEq => Num::B(matches!(ord(), Some(Ordering::Less | Ordering::Equal))),
        BinaryOp::Gt => Num::B(ord() == Some(Ordering::Greater)),
        BinaryOp::GtEq => Num::B(matches!(ord(), Some(Ordering::Greater | Ordering::Equal))),
        BinaryOp::And => Num::B(a.truthy() && b.truthy()),
        BinaryOp::Or => Num::B(a.truthy() || b.truthy()),
    }
}

fn runtime_type(v: &Scalar) -> Result<DataType> {
    v.data_type()
        .ok_or_else(|| Error::Invariant("null reached typed evaluation".into()))
}

pub fn eval_binary(op: BinaryOp, l: Scalar, r: Scalar) -> Result<Scalar> {
    if l.is_null() || r.is_null() {
        return Ok(Scalar::Null);
    }
    let out = binary_type(op, runtime_type(&l)?, runtime_type(&r)?)?;

    if let (Scalar::Str(a), Scalar::Str(b)) = (&l, &r) {
        let o = a.cmp(b);
        return Ok(Scalar::Bool(match op {
            BinaryOp::Eq => o == Ordering::Equal,
            BinaryOp::NotEq => o != Ordering::Equal,
            BinaryOp::Lt => o == Ordering::Less,
            BinaryOp::LtEq => o != Ordering::Greater,
            BinaryOp::Gt => o == Ordering::Greater,
            _ => o != Ordering::Less,
        }));
    }

    let elem = out.element();
    let (Some(a), Some(b)) = (lane(&l), lane(&r)) else {
        return Err(Error::TypeMismatch(format!(
            "operator {} on non-numeric values",
            op.symbol()
        )));
    };
    Ok(match (a, b) {
        (Lane::One(a), Lane::One(b)) => apply(op, a, b, elem).into_scalar(),
        (Lane::Many(a), Lane::One(b)) => {
            pack(elem, a.into_iter().map(|x| apply(op, x, b, elem)).collect())
        }
        (Lane::One(a), Lane::Many(b)) => {
            pack(elem, b.into_iter().map(|y| apply(op, a, y, elem)).collect())
        }
        (Lane::Many(a), Lane::Many(b)) => {
            if a.len() != b.len() {
                return Err(Error::TypeMismatch(format!(
                    "operator {} on vectors of length {} and {}",
                    op.symbol(),
                    a.len(),
                    b.len()
                )));
            }
            pack(
                elem,
                a.into_iter()
                    .zip(b)
                    .map(|(x, y)| apply(op, x, y, elem))
                    .collect(),
            )
        }
    })
}

fn eval_unary(op: UnaryOp, v: Scalar) -> Result<Scalar> {
    if v.is_null() {
        return Ok(Scalar::Null);
    }
    unary_type(op, runtime_type(&v)?)?;
    Ok(match (op, v) {
        (UnaryOp::Not, Scalar::Bool(b)) => Scalar::Bool(!b),
        (UnaryOp::Not, Scalar::BoolVec(v)) => Scalar::BoolVec(v.into_iter().map(|b| !b).collect()),
        (UnaryOp::Neg, Scalar::Bool(b)) => Scalar::I64(-(b as i64)),
        (UnaryOp::Neg, Scalar::I64(i)) => Scalar::I64(i.wrapping_neg()),
        (UnaryOp::Neg, Scalar::F64(f)) => Scalar::F64(-f),
        (UnaryOp::Neg, Scalar::BoolVec(v)) => {
            Scalar::I64Vec(v.into_iter().map(|b| -(b as i64)).collect())
        }
        (UnaryOp::Neg, Scalar::I64Vec(v)) => {
            Scalar::I64Vec(v.into_iter().map(i64::wrapping_neg).collect())
        }
        (UnaryOp::Neg, Scalar::F64Vec(v)) => Scalar::F64Vec(v.into_iter().map(|f| -f).collect()),
        (op, v) => {
            return Err(Error::TypeMismatch(format!("{:?} cannot apply to {:?}", op, v)))
        }
    })
}

fn keep<T>(values: Vec<T>, mask: &[bool]) -> Vec<T> {
    values
        .into_iter()
        .zip(mask)
        .filter_map(|(v, m)| m.then_some(v))
        .collect()
}

fn apply_mask(v: Scalar, m: Scalar) -> Result<Scalar> {
    if v.is_null() || m.is_null() {
        return Ok(Scalar::Null);
    }
    let mask: Vec<bool> = match m {
        Scalar::BoolVec(b) => b,
        Scalar::I64Vec(i) => i.into_iter().map(|x| x != 0).collect(),
        other => {
            return Err(Error::TypeMismatch(format!(
                "mask must be a boolean or integer vector, got {:?}",
                other
            )))
        }
    };
    let len = v
        .vec_len()
        .ok_or_else(|| Error::TypeMismatch(format!("cannot mask non-vector {:?}", v)))?;
    if len != mask.len() {
        return Err(Error::TypeMismatch(format!(
            "mask length {} does not match vector length {}",
            mask.len(),
            len
        )));
    }
    Ok(match v {
        Scalar::BoolVec(x) => Scalar::BoolVec(keep(x, &mask)),
        Scalar::I64Vec(x) => Scalar::I64Vec(keep(x, &mask)),
        Scalar::F64Vec(x) => Scalar::F64Vec(keep(x, &mask)),
        other => return Err(Error::TypeMismatch(format!("cannot mask {:?}", other))),
    })
}
