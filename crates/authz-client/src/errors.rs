use scoped_rag_core_types::FailureKind;
use thiserror::Error;

/// Errors produced while asking the decision service.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthzError {
    #[error("authorization service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("malformed decision: {0}")]
    MalformedDecision(String),
    #[error("authorization service rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("invalid authorization request: {0}")]
    InvalidRequest(String),
    #[error("authorization check timed out")]
    Timeout,
}

impl AuthzError {
    /// Transient failures are retried with backoff; everything else surfaces at once.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthzError::ServiceUnavailable(_) | AuthzError::Timeout)
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            AuthzError::ServiceUnavailable(_) => FailureKind::ServiceUnavailable,
            AuthzError::MalformedDecision(_) => FailureKind::MalformedDecision,
            AuthzError::Rejected { .. } => FailureKind::Rejected,
            AuthzError::InvalidRequest(_) => FailureKind::InvalidRequest,
            AuthzError::Timeout => FailureKind::Timeout,
        }
    }
}
