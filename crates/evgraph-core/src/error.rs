use thiserror::Error;

use crate::id::PartitionId;

/// Canonical result for the whole engine.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("undefined column '{0}'")]
    UndefinedColumn(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("vary on '{column}': {expressions} alternative expression(s) for {tags} tag(s)")]
    TagArityMismatch {
        column: String,
        expressions: usize,
        tags: usize,
    },

    #[error("variation tag '{0}' is already in use on this path")]
    DuplicateTag(String),

    #[error("empty range: {0}")]
    EmptyRange(String),

    #[error("ranges overlap, leave a gap, or exceed the dataset: {0}")]
    OverlapOrGap(String),

    #[error("{partition} failed: {cause}")]
    PartitionFailure {
        partition: PartitionId,
        cause: Box<Error>,
    },

    #[error("dataset spec cannot change while results are triggered; clone the results first")]
    SpecChangeWhileTriggered,

    #[error("undefined function '{0}'")]
    UndefinedFunction(String),

    #[error("I/O failure: {0}")]
    IoFailure(String),

    #[error("column '{0}' is already defined")]
    ColumnExists(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("planning error: {0}")]
    Plan(String),

    #[error("hashing error: {0}")]
    Hash(String),

    #[error("internal invariant failed: {0}")]
    Invariant(String),
}

impl Error {
    /// Wrap an execution error so it is attributed to one partition.
    pub fn in_partition(self, partition: PartitionId) -> Self {
        match self {
            // Already attributed.
            e @ Error::PartitionFailure { .. } => e,
            other => Error::PartitionFailure {
                partition,
                cause: Box::new(other),
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Hash(e.to_string())
    }
}
