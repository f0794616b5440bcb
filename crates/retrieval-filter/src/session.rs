use std::time::{Duration, SystemTime};

use scoped_rag_core_types::{SessionId, Subject};
use scoped_rag_decision_cache::SessionDecisionCache;

use crate::errors::FilterError;
use crate::policy::FilterPolicy;

/// One login's worth of state: the verified subject and its decision cache.
///
/// Sessions are never shared between subjects. Dropping the session drops
/// every decision made for it.
pub struct FilterSession {
    id: SessionId,
    subject: Subject,
    cache: SessionDecisionCache,
    started_at: SystemTime,
}

impl FilterSession {
    pub fn new(subject: Subject, policy: &FilterPolicy) -> Result<Self, FilterError> {
        if subject.is_blank() {
            return Err(FilterError::InvalidSubject("subject is empty".into()));
        }
        Ok(Self {
            id: SessionId::new(),
            subject,
            cache: SessionDecisionCache::with_error_ttl(policy.error_ttl),
            started_at: SystemTime::now(),
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn cache(&self) -> &SessionDecisionCache {
        &self.cache
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Time since login; zero if the wall clock moved backwards.
    pub fn age(&self) -> Duration {
        self.started_at.elapsed().unwrap_or_default()
    }
}
