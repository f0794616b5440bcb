//! Memoizes authorization decisions for one query session.
//!
//! Entries are keyed by (subject, action, resource). Concurrent lookups for
//! a key that is still being decided wait on the same in-flight
//! computation instead of issuing their own. Errors are cached like any
//! other outcome, optionally with a short expiry so a recovered backend is
//! consulted again before the session ends. Nothing is persisted; dropping
//! the cache discards every decision.

mod stats;

pub use stats::CacheStatsSnapshot;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use scoped_rag_core_types::{Action, Decision, ResourceId, Subject};
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::trace;

use crate::stats::CacheStats;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DecisionKey {
    pub subject: Subject,
    pub action: Action,
    pub resource: ResourceId,
}

impl DecisionKey {
    pub fn new(subject: &Subject, action: Action, resource: &ResourceId) -> Self {
        Self {
            subject: subject.clone(),
            action,
            resource: resource.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct CachedDecision {
    decision: Decision,
    expires_at: Option<Instant>,
}

impl CachedDecision {
    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }
}

type Slot = Arc<OnceCell<CachedDecision>>;

pub struct SessionDecisionCache {
    error_ttl: Option<Duration>,
    entries: Mutex<HashMap<DecisionKey, Slot>>,
    stats: CacheStats,
}

impl SessionDecisionCache {
    /// Errors stay cached for the whole session.
    pub fn new() -> Self {
        Self::with_error_ttl(None)
    }

    /// `error_ttl` bounds how long an `Error` outcome is reused; allow and
    /// deny always live until the cache is dropped.
    pub fn with_error_ttl(error_ttl: Option<Duration>) -> Self {
        Self {
            error_ttl: error_ttl.filter(|ttl| !ttl.is_zero()),
            entries: Mutex::new(HashMap::new()),
            stats: CacheStats::default(),
        }
    }

    /// Returns the cached decision for the triple, running `compute` only
    /// when no live entry exists and no other caller is already computing it.
    pub async fn get_or_compute<F, Fut>(
        &self,
        subject: &Subject,
        action: Action,
        resource: &ResourceId,
        compute: F,
    ) -> Decision
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Decision>,
    {
        let key = DecisionKey::new(subject, action, resource);
        let slot = self.slot_for(&key);
        if let Some(cached) = slot.get() {
            self.stats.record_hit();
            return cached.decision;
        }

        let mut computed = false;
        let flag = &mut computed;
        let error_ttl = self.error_ttl;
        let cached = slot
            .get_or_init(move || async move {
                *flag = true;
                let decision = compute().await;
                let expires_at = match (decision, error_ttl) {
                    (Decision::Error(_), Some(ttl)) => Some(Instant::now() + ttl),
                    _ => None,
                };
                CachedDecision {
                    decision,
                    expires_at,
                }
            })
            .await;

        if computed {
            self.stats.record_load();
            trace!(
                target = "decision-cache",
                subject = %key.subject,
                resource = %key.resource,
                decision = ?cached.decision,
                "decision computed"
            );
        } else {
            self.stats.record_coalesced();
        }
        cached.decision
    }

    /// Live cached decision, if any. Never triggers a computation.
    pub fn get(&self, subject: &Subject, action: Action, resource: &ResourceId) -> Option<Decision> {
        let key = DecisionKey::new(subject, action, resource);
        let entries = self.entries.lock();
        entries
            .get(&key)
            .and_then(|slot| slot.get())
            .filter(|cached| !cached.is_expired())
            .map(|cached| cached.decision)
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|slot| slot.get().map_or(false, |cached| !cached.is_expired()))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    fn slot_for(&self, key: &DecisionKey) -> Slot {
        let mut entries = self.entries.lock();
        if let Some(slot) = entries.get_mut(key) {
            if slot.get().map_or(false, CachedDecision::is_expired) {
                self.stats.record_expired();
                *slot = Arc::new(OnceCell::new());
            }
            return slot.clone();
        }
        let slot: Slot = Arc::new(OnceCell::new());
        entries.insert(key.clone(), slot.clone());
        slot
    }
}

impl Default for SessionDecisionCache {
    fn default() -> Self {
        Self::new()
    }
}
