//! Named scalar/vector functions callable from column expressions.
//!
//! Functions are opaque to the engine: pure, side-effect free, resolved by
//! name when a graph node is declared. A name that is not registered is
//! `UndefinedFunction`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use evgraph_core::error::{Error, Result};
use evgraph_core::schema::DataType;
use evgraph_core::types::Scalar;

/// A function callable from expressions.
pub trait ScalarFunction: Send + Sync {
    fn name(&self) -> &str;

    /// Result type for the given argument types, or `TypeMismatch`.
    fn return_type(&self, args: &[DataType]) -> Result<DataType>;

    fn invoke(&self, args: &[Scalar]) -> Result<Scalar>;
}

type FnBody = dyn Fn(&[Scalar]) -> Result<Scalar> + Send + Sync;

/// Closure-backed user function with a declared signature.
#[derive(Clone)]
pub struct FnFunction {
    name: String,
    params: Option<Vec<DataType>>,
    returns: DataType,
    body: Arc<FnBody>,
}

impl FnFunction {
    pub fn new<F>(name: impl Into<String>, returns: DataType, body: F) -> Self
    where
        F: Fn(&[Scalar]) -> Result<Scalar> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params: None,
            returns,
            body: Arc::new(body),
        }
    }

    /// Declare parameter types; calls are then checked for arity and type.
    /// Integer/boolean scalars are accepted (and converted) for `Float64`.
    pub fn with_params(mut self, params: Vec<DataType>) -> Self {
        self.params = Some(params);
        self
    }
}

impl fmt::Debug for FnFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFunction")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .finish()
    }
}

fn param_accepts(param: DataType, arg: DataType) -> bool {
    param == arg || (param == DataType::Float64 && arg.is_numeric())
}

impl ScalarFunction for FnFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn return_type(&self, args: &[DataType]) -> Result<DataType> {
        if let Some(params) = &self.params {
            if params.len() != args.len() {
                return Err(Error::TypeMismatch(format!(
                    "{}() takes {} argument(s), got {}",
                    self.name,
                    params.len(),
                    args.len()
                )));
            }
            for (i, (p, a)) in params.iter().zip(args).enumerate() {
                if !param_accepts(*p, *a) {
                    return Err(Error::TypeMismatch(format!(
                        "{}() argument {} expects {}, got {}",
                        self.name, i, p, a
                    )));
                }
            }
        }
        Ok(self.returns)
    }

    fn invoke(&self, args: &[Scalar]) -> Result<Scalar> {
        match &self.params {
            Some(params) if params.iter().any(|p| *p == DataType::Float64) => {
                let coerced: Vec<Scalar> = args
                    .iter()
                    .zip(params)
                    .map(|(a, p)| match (p, a) {
                        (DataType::Float64, Scalar::I64(_) | Scalar::Bool(_)) => {
                            a.as_f64().map(Scalar::F64).unwrap_or(Scalar::Null)
                        }
                        _ => a.clone(),
                    })
                    .collect();
                (self.body)(&coerced)
            }
            _ => (self.body)(args),
        }
    }
}

/// Registry of callable functions, keyed by name.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    funcs: BTreeMap<String, Arc<dyn ScalarFunction>>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.funcs.keys()).finish()
    }
}

impl FunctionRegistry {
    /// Registry without any functions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the vector builtins.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        for f in crate::builtins::all() {
            reg.funcs.insert(f.name().to_string(), f);
        }
        reg
    }

    /// Register (or replace) a function.
    pub fn register(&mut self, f: impl ScalarFunction + 'static) -> &mut Self {
        self.funcs.insert(f.name().to_string(), Arc::new(f));
        self
    }

    pub fn register_fn<F>(&mut self, name: &str, returns: DataType, body: F) -> &mut Self
    where
        F: Fn(&[Scalar]) -> Result<Scalar> + Send + Sync + 'static,
    {
        self.register(FnFunction::new(name, returns, body))
    }

    pub fn get(&self, name: &str) -> Result<&Arc<dyn ScalarFunction>> {
        self.funcs
            .get(name)
            .ok_or_else(|| Error::UndefinedFunction(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.funcs.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.funcs.keys().cloned().collect()
    }
}
