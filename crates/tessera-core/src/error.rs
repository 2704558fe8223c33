//! Error taxonomy shared by every tessera crate

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Transient filesystem failure. Listing and weighing recover from these locally.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache document {path} could not be written: {reason}")]
    CacheFormat { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid search query {query:?}: {reason}")]
    InvalidQuery { query: String, reason: String },

    #[error("path {0} is not under any attached root")]
    UnknownRoot(PathBuf),

    /// Selection state is corrupted. Indicates a bug rather than an environment problem.
    #[error("selection invariant violated at {path}: {detail}")]
    Invariant { path: PathBuf, detail: String },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_invariant(&self) -> bool {
        matches!(self, Error::Invariant { .. })
    }
}
