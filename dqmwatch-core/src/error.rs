//! Status codes and error types.

use core::fmt;

use thiserror::Error;

/// Plain status code of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Failure,
    NotFound,
    NotInitialized,
    AlreadyInitialized,
    AlreadyPresent,
    OutOfRange,
    NotAllowed,
    InvalidParameter,
    Unchanged,
    InvalidPtr,
}

impl StatusCode {
    /// Conventional upper-case name, e.g. `STATUS_CODE_NOT_FOUND`.
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Failure => "STATUS_CODE_FAILURE",
            StatusCode::NotFound => "STATUS_CODE_NOT_FOUND",
            StatusCode::NotInitialized => "STATUS_CODE_NOT_INITIALIZED",
            StatusCode::AlreadyInitialized => "STATUS_CODE_ALREADY_INITIALIZED",
            StatusCode::AlreadyPresent => "STATUS_CODE_ALREADY_PRESENT",
            StatusCode::OutOfRange => "STATUS_CODE_OUT_OF_RANGE",
            StatusCode::NotAllowed => "STATUS_CODE_NOT_ALLOWED",
            StatusCode::InvalidParameter => "STATUS_CODE_INVALID_PARAMETER",
            StatusCode::Unchanged => "STATUS_CODE_UNCHANGED",
            StatusCode::InvalidPtr => "STATUS_CODE_INVALID_PTR",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by the engine's public operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DqmError {
    /// Generic failure, e.g. an aborted bulk run.
    #[error("Operation failed: {0}")]
    Failure(String),

    /// A directory, element, test or stored object does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not initialized: {0}")]
    NotInitialized(String),

    #[error("Already initialized: {0}")]
    AlreadyInitialized(String),

    /// Something with the same identity is already registered.
    #[error("Already present: {0}")]
    AlreadyPresent(String),

    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// The operation is refused for this object type.
    #[error("Not allowed: {0}")]
    NotAllowed(String),

    /// Malformed path, configuration or argument.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Unchanged: {0}")]
    Unchanged(String),

    #[error("Invalid pointer: {0}")]
    InvalidPtr(String),
}

impl DqmError {
    /// The status code of this error.
    pub fn code(&self) -> StatusCode {
        match self {
            DqmError::Failure(_) => StatusCode::Failure,
            DqmError::NotFound(_) => StatusCode::NotFound,
            DqmError::NotInitialized(_) => StatusCode::NotInitialized,
            DqmError::AlreadyInitialized(_) => StatusCode::AlreadyInitialized,
            DqmError::AlreadyPresent(_) => StatusCode::AlreadyPresent,
            DqmError::OutOfRange(_) => StatusCode::OutOfRange,
            DqmError::NotAllowed(_) => StatusCode::NotAllowed,
            DqmError::InvalidParameter(_) => StatusCode::InvalidParameter,
            DqmError::Unchanged(_) => StatusCode::Unchanged,
            DqmError::InvalidPtr(_) => StatusCode::InvalidPtr,
        }
    }

    pub(crate) fn not_found(what: impl fmt::Display) -> Self {
        DqmError::NotFound(what.to_string())
    }

    pub(crate) fn already_present(what: impl fmt::Display) -> Self {
        DqmError::AlreadyPresent(what.to_string())
    }

    pub(crate) fn invalid(what: impl fmt::Display) -> Self {
        DqmError::InvalidParameter(what.to_string())
    }
}

impl From<serde_json::Error> for DqmError {
    fn from(err: serde_json::Error) -> Self {
        DqmError::InvalidParameter(format!("JSON: {err}"))
    }
}

impl From<std::io::Error> for DqmError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => DqmError::NotFound(err.to_string()),
            _ => DqmError::Failure(err.to_string()),
        }
    }
}

/// Result alias used across the engine.
pub type Result<T, E = DqmError> = core::result::Result<T, E>;
