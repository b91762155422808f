use thiserror::Error;

// ── Error codes ─────────────────────────────────────────────────────
//
// Stable, machine-readable identifiers. Callers match on these,
// never on the human-readable message string.

/// Stable error code constants.
pub mod error_code {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const ALREADY_EXISTS: &str = "ALREADY_EXISTS";
    pub const INVALID_PARAMETER: &str = "INVALID_PARAMETER";
    pub const READ_ONLY: &str = "READ_ONLY";
    pub const PARTIAL_FAILURE: &str = "PARTIAL_FAILURE";
    pub const INTERNAL: &str = "INTERNAL";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
}

// ── ServiceError ────────────────────────────────────────────────────

/// Unified service error type shared by every crate in the workspace.
///
/// Each variant maps to a stable error code (see [`error_code`]). The
/// display string is only the message; the code carries the kind.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Entity does not exist, or is not visible under the required permission.
    #[error("{0}")]
    NotFound(String),

    /// Name collision / entity already exists.
    #[error("{0}")]
    Conflict(String),

    /// A required field is missing or malformed. Raised before any write.
    #[error("{0}")]
    Validation(String),

    /// Attempted write to read-only data.
    #[error("{0}")]
    ReadOnly(String),

    /// A multi-document operation stopped part-way; earlier writes remain.
    #[error("{0}")]
    PartialFailure(String),

    /// Storage backend failure.
    #[error("{0}")]
    Storage(String),

    /// Unexpected internal error.
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable, machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => error_code::NOT_FOUND,
            ServiceError::Conflict(_) => error_code::ALREADY_EXISTS,
            ServiceError::Validation(_) => error_code::INVALID_PARAMETER,
            ServiceError::ReadOnly(_) => error_code::READ_ONLY,
            ServiceError::PartialFailure(_) => error_code::PARTIAL_FAILURE,
            ServiceError::Storage(_) => error_code::STORAGE_ERROR,
            ServiceError::Internal(_) => error_code::INTERNAL,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound(_))
    }
}
