use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("dataset '{0}' not found")]
    NotFound(String),

    #[error("bad data: {0}")]
    Format(String),
}

pub type Result<T> = std::result::Result<T, IoError>;

impl From<IoError> for evgraph_core::Error {
    fn from(e: IoError) -> Self {
        evgraph_core::Error::IoFailure(e.to_string())
    }
}
