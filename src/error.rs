use thiserror::Error;

/// Failure classes surfaced by a bulk import run. Each variant maps to
/// exactly one user-facing message; none of them are fatal to the process.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ImportError {
    #[error("{0}")]
    Validation(String),

    #[error("cannot open {0}")]
    Io(String),

    #[error("{0}")]
    Parse(String),

    #[error("import cancelled")]
    Cancelled,

    #[error("{0}")]
    Storage(String),
}
