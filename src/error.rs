//! Error types for the barangay request system.

use thiserror::Error;

use crate::directory::{ResidentId, UserId};
use crate::request::{RequestId, RequestStatus};

/// Result type alias using the barangay error type.
pub type Result<T> = std::result::Result<T, BarangayError>;

/// Main error type for the barangay request system.
#[derive(Error, Debug)]
pub enum BarangayError {
    /// Document request not found (or not visible to the caller)
    #[error("Document request not found: {0}")]
    RequestNotFound(RequestId),

    /// Resident record not found
    #[error("Resident not found: {0}")]
    ResidentNotFound(ResidentId),

    /// User record not found
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// The requested status change is not an edge of the lifecycle
    #[error("Invalid transition: request {id} cannot move from '{from}' to '{to}'")]
    InvalidTransition {
        id: RequestId,
        from: RequestStatus,
        to: RequestStatus,
    },

    /// The acting user's role does not permit the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Validation error (e.g. malformed input, mismatched reference number)
    #[error("Validation error: {0}")]
    Validation(String),

    /// An account with this email already exists
    #[error("Email already in use: {0}")]
    EmailAlreadyInUse(String),

    /// Wrong email or password
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// The hosted text model failed or answered outside its schema
    #[error("Text model error: {0}")]
    TextModel(String),

    /// HTTP client error
    #[error("HTTP request failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BarangayError {
    /// True for errors caused by the caller's input rather than the system.
    ///
    /// Callers surface these to the user as-is; everything else is logged.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            BarangayError::InvalidTransition { .. }
                | BarangayError::Forbidden(_)
                | BarangayError::Validation(_)
                | BarangayError::EmailAlreadyInUse(_)
                | BarangayError::InvalidCredentials
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_invalid_transition_message_names_both_states() {
        let err = BarangayError::InvalidTransition {
            id: RequestId(Uuid::nil()),
            from: RequestStatus::Paid,
            to: RequestStatus::Rejected,
        };
        let msg = err.to_string();
        assert!(msg.contains("'Paid'"));
        assert!(msg.contains("'Rejected'"));
        assert!(err.is_user_facing());
    }

    #[test]
    fn test_other_errors_are_not_user_facing() {
        let err = BarangayError::Other(anyhow::anyhow!("connection reset"));
        assert!(!err.is_user_facing());
    }
}
