use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::SystemTime;

use futures::stream::{self, StreamExt};
use scoped_rag_authz_client::{decision_of, AuthorizationClient, AuthzError};
use scoped_rag_core_types::{Action, Chunk, Decision, ResourceId, Subject};
use scoped_rag_resource_index::{IndexError, ResourceIndex};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::audit::FilterAuditEvent;
use crate::errors::FilterError;
use crate::metrics;
use crate::policy::FilterPolicy;
use crate::report::{ExclusionReason, FilterReport, Filtered};
use crate::session::FilterSession;

const AUDIT_CHANNEL_CAPACITY: usize = 1024;

/// Retains only the candidates the session's subject may read.
pub struct RetrievalFilter {
    authz: Arc<dyn AuthorizationClient>,
    index: Arc<dyn ResourceIndex>,
    policy: FilterPolicy,
    events: broadcast::Sender<FilterAuditEvent>,
}

impl RetrievalFilter {
    pub fn new(
        authz: Arc<dyn AuthorizationClient>,
        index: Arc<dyn ResourceIndex>,
        policy: FilterPolicy,
    ) -> Result<Self, FilterError> {
        policy.validate()?;
        let (events, _) = broadcast::channel(AUDIT_CHANNEL_CAPACITY);
        Ok(Self {
            authz,
            index,
            policy,
            events,
        })
    }

    pub fn policy(&self) -> &FilterPolicy {
        &self.policy
    }

    /// Starts a session whose cache follows this filter's error TTL.
    pub fn open_session(&self, subject: Subject) -> Result<FilterSession, FilterError> {
        let session = FilterSession::new(subject, &self.policy)?;
        debug!(
            target = "retrieval-filter",
            session = %session.id(),
            subject = %session.subject(),
            "session opened"
        );
        Ok(session)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FilterAuditEvent> {
        self.events.subscribe()
    }

    pub async fn filter(&self, session: &FilterSession, candidates: Vec<Chunk>) -> Vec<Chunk> {
        self.filter_with_report(session, candidates).await.chunks
    }

    pub async fn filter_with_report(
        &self,
        session: &FilterSession,
        candidates: Vec<Chunk>,
    ) -> Filtered {
        let started = Instant::now();
        let deadline = started + self.policy.call_deadline;
        metrics::record_filter_call();
        let mut report = FilterReport::new(candidates.len());

        let resolved: Vec<Result<ResourceId, IndexError>> = candidates
            .iter()
            .map(|chunk| self.index.resource_of(chunk))
            .collect();

        let mut seen = HashSet::new();
        let distinct: Vec<ResourceId> = resolved
            .iter()
            .flatten()
            .filter(|resource| seen.insert(*resource))
            .cloned()
            .collect();
        report.distinct_resources = distinct.len();

        let decided = self.decide_all(session, &distinct, deadline).await;

        let mut chunks = Vec::new();
        let mut reported: HashSet<ResourceId> = HashSet::new();
        for (chunk, resolution) in candidates.into_iter().zip(resolved) {
            let resource = match resolution {
                Ok(resource) => resource,
                Err(err) => {
                    debug!(
                        target = "retrieval-filter",
                        session = %session.id(),
                        chunk = %chunk.id,
                        "chunk excluded: {err}"
                    );
                    self.exclude(&mut report, session, None, Some(&chunk), ExclusionReason::ResourceNotFound);
                    continue;
                }
            };
            let reason = match decided.get(&resource) {
                Some(Decision::Allow) => {
                    report.allowed += 1;
                    chunks.push(chunk);
                    continue;
                }
                Some(Decision::Deny) => ExclusionReason::Denied,
                Some(Decision::Error(kind)) => ExclusionReason::Failed(*kind),
                None => ExclusionReason::DeadlineExceeded,
            };
            let first = reported.insert(resource.clone());
            if first {
                self.exclude(&mut report, session, Some(&resource), None, reason);
            } else {
                report.record(reason);
                metrics::record_exclusion(reason);
            }
        }
        metrics::record_allowed(report.allowed);
        report.elapsed = started.elapsed();

        if report.is_degraded() {
            warn!(
                target = "retrieval-filter",
                session = %session.id(),
                subject = %session.subject(),
                candidates = report.candidates,
                allowed = report.allowed,
                excluded = report.excluded(),
                failed = report.failed_total(),
                deadline_exceeded = report.deadline_exceeded,
                "filter result degraded; excluded chunks may include authorized content"
            );
        } else {
            info!(
                target = "retrieval-filter",
                session = %session.id(),
                subject = %session.subject(),
                candidates = report.candidates,
                allowed = report.allowed,
                excluded = report.excluded(),
                denied = report.denied,
                not_found = report.not_found,
                elapsed_ms = report.elapsed.as_millis() as u64,
                session_age_ms = session.age().as_millis() as u64,
                "candidates filtered"
            );
        }

        Filtered { chunks, report }
    }

    /// Decides every resource, at most `concurrency` at a time, until the
    /// call deadline. Resources missing from the result were not decided.
    async fn decide_all(
        &self,
        session: &FilterSession,
        resources: &[ResourceId],
        deadline: Instant,
    ) -> HashMap<ResourceId, Decision> {
        let mut decided = HashMap::with_capacity(resources.len());
        if resources.is_empty() {
            return decided;
        }

        let mut pending = stream::iter(resources.iter().cloned())
            .map(|resource| async move {
                let decision = self.decide(session, &resource).await;
                (resource, decision)
            })
            .buffer_unordered(self.policy.concurrency);

        loop {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some((resource, decision))) => {
                    decided.insert(resource, decision);
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        target = "retrieval-filter",
                        session = %session.id(),
                        decided = decided.len(),
                        undecided = resources.len() - decided.len(),
                        "call deadline exceeded"
                    );
                    break;
                }
            }
        }
        decided
    }

    async fn decide(&self, session: &FilterSession, resource: &ResourceId) -> Decision {
        let subject = session.subject();
        let authz = &self.authz;
        let check_timeout = self.policy.check_timeout;
        session
            .cache()
            .get_or_compute(subject, Action::Read, resource, move || async move {
                metrics::record_check_issued();
                let result =
                    match tokio::time::timeout(check_timeout, authz.check(subject, Action::Read, resource))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(AuthzError::Timeout),
                    };
                if let Err(err) = &result {
                    warn!(
                        target = "retrieval-filter",
                        subject = %subject,
                        resource = %resource,
                        kind = %err.failure_kind(),
                        "authorization check failed: {err}"
                    );
                }
                decision_of(result)
            })
            .await
    }

    fn exclude(
        &self,
        report: &mut FilterReport,
        session: &FilterSession,
        resource: Option<&ResourceId>,
        chunk: Option<&Chunk>,
        reason: ExclusionReason,
    ) {
        report.record(reason);
        metrics::record_exclusion(reason);
        if self.events.receiver_count() == 0 {
            return;
        }
        let event = FilterAuditEvent {
            session: session.id().clone(),
            subject: session.subject().clone(),
            resource: resource.cloned(),
            chunk: chunk.map(|chunk| chunk.id.clone()),
            reason,
            timestamp: SystemTime::now(),
        };
        if let Err(err) = self.events.send(event) {
            debug!(target = "retrieval-filter", "audit event dropped: {err}");
        }
    }
}
