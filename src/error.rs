use thiserror::Error;

use crate::types::Type;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorKind {
    /// Misuse of the API, detected synchronously. Never worth retrying.
    Usage,
    /// The SMT solver gave up within the configured time budget.
    Timeout,
    /// The solver process failed or replied with something unexpected.
    Solver,
    /// Exhaustion of an external resource (process spawning, pipes).
    Resource,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("type mismatch in `{op}`: expected {expected}, found {found}")]
    TypeMismatch {
        op: &'static str,
        expected: String,
        found: Type,
    },

    #[error("invalid type: {0}")]
    InvalidType(String),

    #[error("disallowed nesting: {inner} cannot be used as {position} of {outer}")]
    DisallowedNesting {
        outer: Type,
        inner: Type,
        position: &'static str,
    },

    #[error("type {ty} is not supported by the {backend} backend")]
    UnsupportedType { backend: &'static str, ty: Type },

    #[error("operands belong to different expression contexts")]
    ContextMismatch,

    #[error("objects belong to different BDD managers")]
    ManagerMismatch,

    #[error("state set is empty")]
    EmptySet,

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("expression is not a variable: {0}")]
    NotAVariable(String),

    #[error("solver timed out")]
    Timeout,

    #[error("solver error: {0}")]
    Solver(String),

    #[error("failed to communicate with the solver")]
    Io(#[from] std::io::Error),

    #[error("cannot parse solver output: {0}")]
    Parse(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TypeMismatch { .. }
            | Error::InvalidType(_)
            | Error::DisallowedNesting { .. }
            | Error::UnsupportedType { .. }
            | Error::ContextMismatch
            | Error::ManagerMismatch
            | Error::EmptySet
            | Error::InvalidValue(_)
            | Error::NotAVariable(_) => ErrorKind::Usage,
            Error::Timeout => ErrorKind::Timeout,
            Error::Solver(_) | Error::Parse(_) => ErrorKind::Solver,
            Error::Io(_) => ErrorKind::Resource,
        }
    }

    pub fn is_usage(&self) -> bool {
        self.kind() == ErrorKind::Usage
    }

    pub(crate) fn mismatch(op: &'static str, expected: impl Into<String>, found: &Type) -> Self {
        Error::TypeMismatch {
            op,
            expected: expected.into(),
            found: found.clone(),
        }
    }
}
