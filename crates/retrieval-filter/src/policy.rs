use std::time::Duration;

use crate::errors::FilterError;

/// Timing and fan-out limits for one `filter` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterPolicy {
    /// Bound on a single authorization check, retries included.
    pub check_timeout: Duration,
    /// Bound on a whole `filter` call; undecided resources are excluded.
    pub call_deadline: Duration,
    /// Reuse window for `Error` outcomes. `None` keeps them for the session.
    pub error_ttl: Option<Duration>,
    /// Maximum authorization checks in flight per call.
    pub concurrency: usize,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            check_timeout: Duration::from_secs(5),
            call_deadline: Duration::from_secs(15),
            error_ttl: None,
            concurrency: 8,
        }
    }
}

impl FilterPolicy {
    pub fn validate(&self) -> Result<(), FilterError> {
        if self.concurrency == 0 {
            return Err(FilterError::InvalidPolicy(
                "concurrency must be at least 1".into(),
            ));
        }
        if self.check_timeout.is_zero() {
            return Err(FilterError::InvalidPolicy(
                "check_timeout must be positive".into(),
            ));
        }
        if self.call_deadline < self.check_timeout {
            return Err(FilterError::InvalidPolicy(format!(
                "call_deadline ({:?}) is shorter than check_timeout ({:?})",
                self.call_deadline, self.check_timeout
            )));
        }
        if matches!(self.error_ttl, Some(ttl) if ttl.is_zero()) {
            return Err(FilterError::InvalidPolicy(
                "error_ttl must be positive when set".into(),
            ));
        }
        Ok(())
    }
}
