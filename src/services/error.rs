//! Service error taxonomy
//!
//! Every service operation returns [`ServiceError`]; the HTTP layer turns it
//! into a status code and a uniform body.

use thiserror::Error;

use super::validation::ValidationErrors;
use crate::db::StoreError;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Request fields failed validation
    #[error("Validation error: {0}")]
    Validation(ValidationErrors),

    /// Target document does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Store unreachable, timed out or holding undecodable data
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Write kept colliding with concurrent writers
    #[error("Store conflict: {0}")]
    StoreConflict(String),

    /// Document key already taken
    #[error("Duplicate key: {0}")]
    Duplicate(String),

    /// Outgoing mail could not be delivered
    #[error("Failed to send mail: {0}")]
    DispatchFailed(String),

    /// Bot-check token could not be verified
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// Lead could not be registered with the CRM
    #[error("Registration failed: {0}")]
    RegistrationFailed(String),
}

impl ServiceError {
    /// Stable machine-readable code
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "VALIDATION_ERROR",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            ServiceError::StoreConflict(_) => "STORE_CONFLICT",
            ServiceError::Duplicate(_) => "CONFLICT",
            ServiceError::DispatchFailed(_) => "DISPATCH_FAILED",
            ServiceError::VerificationFailed(_) => "VERIFICATION_FAILED",
            ServiceError::RegistrationFailed(_) => "REGISTRATION_FAILED",
        }
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(errors: ValidationErrors) -> Self {
        ServiceError::Validation(errors)
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            StoreError::Unavailable(reason) => ServiceError::StoreUnavailable(reason),
            StoreError::Conflict(reason) => ServiceError::StoreConflict(reason),
            StoreError::Duplicate(key) => ServiceError::Duplicate(key),
            StoreError::InvalidDocument(reason) => {
                ServiceError::Validation(ValidationErrors::single("document", reason))
            }
            StoreError::Corrupt(reason) => {
                tracing::error!(reason = %reason, "Stored document failed to decode");
                ServiceError::StoreUnavailable(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_mapping() {
        let err: ServiceError = StoreError::NotFound("blog entry 'x'".into()).into();
        assert_eq!(err.kind(), "NOT_FOUND");

        let err: ServiceError = StoreError::Duplicate("x".into()).into();
        assert_eq!(err.kind(), "CONFLICT");

        let err: ServiceError = StoreError::Corrupt("bad json".into()).into();
        assert_eq!(err.kind(), "STORE_UNAVAILABLE");

        let err: ServiceError = StoreError::InvalidDocument("no key".into()).into();
        assert_eq!(err.kind(), "VALIDATION_ERROR");
    }
}
