//! The closed set of error kinds the orchestrator and its collaborators may
//! surface, plus a stable mapping onto webhook-surface status codes.

use thiserror::Error;

/// Closed-set error kind. Every non-[`Error::Internal`] variant here is a
/// *kind* in the sense of the design's error model: stable, matched on by
/// callers, and mapped to an HTTP-like status at the webhook/API boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error("webhook signature header is missing")]
    SignatureMissing,

    #[error("webhook signature is invalid")]
    SignatureInvalid,

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("payload exceeds the configured size cap")]
    PayloadTooLarge,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("backup failed: {0}")]
    BackupFailed(String),

    #[error("apply failed: {0}")]
    ApplyFailed(String),

    #[error("health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("operation timed out")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,

    #[error("rollback failed: {0}")]
    RollbackFailed(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable discriminant name, matching the closed set enumerated in the
    /// design's error handling section. Used in audit entries and test
    /// assertions where comparing on the `Error` type itself would be
    /// awkward (e.g. across a thread boundary after `to_string()`).
    pub fn kind(&self) -> &'static str {
        match self {
            Error::SignatureMissing => "signature_missing",
            Error::SignatureInvalid => "signature_invalid",
            Error::Malformed(_) => "malformed",
            Error::PayloadTooLarge => "payload_too_large",
            Error::RateLimited => "rate_limited",
            Error::Unauthorized => "unauthorized",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::Validation(_) => "validation",
            Error::BackupFailed(_) => "backup_failed",
            Error::ApplyFailed(_) => "apply_failed",
            Error::HealthCheckFailed(_) => "health_check_failed",
            Error::Timeout => "timeout",
            Error::Cancelled => "cancelled",
            Error::RollbackFailed(_) => "rollback_failed",
            Error::Internal(_) => "internal",
        }
    }

    /// Whether a stage retry policy may re-attempt an operation that failed
    /// with this error kind. `Timeout` and `HealthCheckFailed` are
    /// retriable by default (the stage's own retry budget still applies);
    /// everything else is terminal for the current attempt.
    pub fn retriable(&self) -> bool {
        matches!(self, Error::Timeout | Error::HealthCheckFailed(_))
    }

    /// HTTP-style status code for the webhook/API surface (§6).
    pub fn status_code(&self) -> u16 {
        match self {
            Error::SignatureMissing | Error::SignatureInvalid | Error::Unauthorized => 401,
            Error::Malformed(_) => 400,
            Error::PayloadTooLarge => 413,
            Error::RateLimited => 429,
            Error::NotFound(_) => 404,
            Error::Conflict(_) => 409,
            Error::Validation(_) => 400,
            Error::BackupFailed(_)
            | Error::ApplyFailed(_)
            | Error::HealthCheckFailed(_)
            | Error::RollbackFailed(_) => 502,
            Error::Timeout => 504,
            Error::Cancelled => 409,
            Error::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_stable_and_does_not_leak_message() {
        let e = Error::Validation("secret=abc123".into());
        assert_eq!(e.kind(), "validation");
        assert_eq!(e.status_code(), 400);
    }

    #[test]
    fn only_timeout_and_health_check_failed_are_retriable() {
        assert!(Error::Timeout.retriable());
        assert!(Error::HealthCheckFailed("x".into()).retriable());
        assert!(!Error::ApplyFailed("x".into()).retriable());
        assert!(!Error::Validation("x".into()).retriable());
    }

    #[test]
    fn signature_errors_map_to_401() {
        assert_eq!(Error::SignatureMissing.status_code(), 401);
        assert_eq!(Error::SignatureInvalid.status_code(), 401);
    }
}
