use std::io;

use bincode::error::{DecodeError, EncodeError};
use rusqlite::Error as SqliteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NeighborError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The invalid-argument case for a query path missing from the corpus
    /// or its file index. Match it alongside `InvalidArgument`.
    #[error("path not found in corpus: {0}")]
    UnknownPath(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("database error: {0}")]
    Db(#[from] SqliteError),

    #[error("encode error: {0}")]
    Encode(String),
}

impl From<EncodeError> for NeighborError {
    fn from(err: EncodeError) -> Self {
        NeighborError::Encode(err.to_string())
    }
}

impl From<DecodeError> for NeighborError {
    fn from(err: DecodeError) -> Self {
        NeighborError::Encode(err.to_string())
    }
}

impl From<serde_json::Error> for NeighborError {
    fn from(err: serde_json::Error) -> Self {
        NeighborError::Encode(err.to_string())
    }
}

impl NeighborError {
    /// True for `InvalidArgument` and `UnknownPath`.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            NeighborError::InvalidArgument(_) | NeighborError::UnknownPath(_)
        )
    }
}

pub type CoreResult<T> = Result<T, NeighborError>;
