#![forbid(unsafe_code)]
//! evgraph-core: shared vocabulary of the engine.
//!
//! Pure data and algebra only: ids, the error taxonomy, schemas and values,
//! the expression AST, action declarations and their mergeable results,
//! dataset specs with version tokens, configuration, hashing and manifests.
//! No threads and no I/O live here.

pub mod action;
pub mod config;
pub mod error;
pub mod expr;
pub mod hash;
pub mod histogram;
pub mod id;
pub mod manifest;
pub mod prelude;
pub mod result;
pub mod schema;
pub mod spec;
pub mod types;

pub use error::{Error, Result};

/// Engine version recorded in run manifests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the implicit column holding the global entry number.
pub const ENTRY_COLUMN: &str = "_entry";
