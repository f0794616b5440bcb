use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use scoped_rag_authz_client::{AuthorizationClient, AuthzError};
use scoped_rag_core_types::{Action, Chunk, ChunkId, FailureKind, ResourceId, Subject, Verdict};
use scoped_rag_resource_index::MetadataResourceIndex;
use scoped_rag_retrieval_filter::{
    ExclusionReason, FilterPolicy, FilterSession, RetrievalFilter,
};

#[derive(Clone, Copy)]
enum Rule {
    Allow,
    Deny,
    Unavailable,
    /// Allow after a delay.
    Slow(Duration),
    Hang,
}

#[derive(Default)]
struct ScriptedAuthz {
    rules: HashMap<(String, String), Rule>,
    calls: Mutex<HashMap<(String, String), usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedAuthz {
    fn rule(mut self, subject: &str, resource: &str, rule: Rule) -> Self {
        self.rules
            .insert((subject.to_string(), resource.to_string()), rule);
        self
    }

    fn calls_for(&self, subject: &str, resource: &str) -> usize {
        self.calls
            .lock()
            .get(&(subject.to_string(), resource.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuthorizationClient for ScriptedAuthz {
    async fn check(
        &self,
        subject: &Subject,
        action: Action,
        resource: &ResourceId,
    ) -> Result<Verdict, AuthzError> {
        assert_eq!(action, Action::Read);
        let key = (subject.as_str().to_string(), resource.as_str().to_string());
        *self.calls.lock().entry(key.clone()).or_default() += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        match self.rules.get(&key).copied().unwrap_or(Rule::Deny) {
            Rule::Allow => Ok(Verdict::Allow),
            Rule::Deny => Ok(Verdict::Deny),
            Rule::Unavailable => Err(AuthzError::ServiceUnavailable("connection refused".into())),
            Rule::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(Verdict::Allow)
            }
            Rule::Hang => std::future::pending().await,
        }
    }
}

fn chunk(id: &str, rank: u32, resource: &str) -> Chunk {
    Chunk::new(ChunkId::new(id).unwrap(), rank, format!("text of {id}"))
        .with_metadata("id", resource)
}

fn orphan(id: &str, rank: u32) -> Chunk {
    Chunk::new(ChunkId::new(id).unwrap(), rank, "orphaned text")
}

fn ids(chunks: &[Chunk]) -> Vec<&str> {
    chunks.iter().map(|chunk| chunk.id.as_str()).collect()
}

fn subject(raw: &str) -> Subject {
    Subject::new(raw).unwrap()
}

fn filter_with(authz: Arc<ScriptedAuthz>, policy: FilterPolicy) -> RetrievalFilter {
    RetrievalFilter::new(authz, Arc::new(MetadataResourceIndex::default()), policy).unwrap()
}

fn session(filter: &RetrievalFilter, who: &str) -> FilterSession {
    filter.open_session(subject(who)).unwrap()
}

#[tokio::test]
async fn denied_resource_is_dropped_and_allowed_kept() {
    let authz = Arc::new(
        ScriptedAuthz::default()
            .rule("alice", "fileA", Rule::Allow)
            .rule("alice", "fileB", Rule::Deny),
    );
    let filter = filter_with(authz.clone(), FilterPolicy::default());
    let session = session(&filter, "alice");

    let filtered = filter
        .filter_with_report(
            &session,
            vec![chunk("a1", 1, "fileA"), chunk("b1", 2, "fileB"), chunk("b2", 3, "fileB")],
        )
        .await;
    assert_eq!(ids(&filtered.chunks), vec!["a1"]);
    assert_eq!(filtered.report.denied, 2);
    assert_eq!(filtered.report.excluded(), 2);
    assert!(!filtered.report.is_degraded());
}

#[tokio::test]
async fn service_outage_yields_empty_result_not_error() {
    let authz = Arc::new(
        ScriptedAuthz::default()
            .rule("alice", "fileA", Rule::Unavailable)
            .rule("alice", "fileB", Rule::Unavailable),
    );
    let filter = filter_with(authz, FilterPolicy::default());
    let session = session(&filter, "alice");

    let filtered = filter
        .filter_with_report(&session, vec![chunk("a1", 1, "fileA"), chunk("b1", 2, "fileB")])
        .await;
    assert!(filtered.chunks.is_empty());
    assert!(filtered.report.is_degraded());
    assert_eq!(
        filtered.report.failed.get(&FailureKind::ServiceUnavailable),
        Some(&2)
    );
}

#[tokio::test]
async fn shared_resource_is_checked_once() {
    let authz = Arc::new(ScriptedAuthz::default().rule("bob", "fileC", Rule::Allow));
    let filter = filter_with(authz.clone(), FilterPolicy::default());
    let session = session(&filter, "bob");

    let candidates: Vec<Chunk> = (1..=5)
        .map(|rank| chunk(&format!("c{rank}"), rank, "fileC"))
        .collect();
    let filtered = filter.filter_with_report(&session, candidates).await;

    assert_eq!(ids(&filtered.chunks), vec!["c1", "c2", "c3", "c4", "c5"]);
    assert_eq!(authz.calls_for("bob", "fileC"), 1);
    assert_eq!(filtered.report.distinct_resources, 1);
}

#[tokio::test]
async fn denied_resource_leaks_no_chunk() {
    let authz = Arc::new(ScriptedAuthz::default().rule("alice", "fileA", Rule::Deny));
    let filter = filter_with(authz.clone(), FilterPolicy::default());
    let session = session(&filter, "alice");

    let filtered = filter
        .filter_with_report(&session, vec![chunk("a1", 1, "fileA"), chunk("a2", 2, "fileA")])
        .await;
    assert!(filtered.chunks.is_empty());
    assert_eq!(filtered.report.denied, 2);
    assert!(!filtered.report.is_degraded());
    assert_eq!(authz.calls_for("alice", "fileA"), 1);
}

#[tokio::test]
async fn output_is_ordered_subsequence_of_input() {
    let authz = Arc::new(
        ScriptedAuthz::default()
            .rule("alice", "fileA", Rule::Slow(Duration::from_millis(50)))
            .rule("alice", "fileB", Rule::Deny)
            .rule("alice", "fileC", Rule::Allow)
            .rule("alice", "fileD", Rule::Slow(Duration::from_millis(5))),
    );
    let filter = filter_with(authz, FilterPolicy::default());
    let session = session(&filter, "alice");

    let candidates = vec![
        chunk("d1", 1, "fileD"),
        chunk("a1", 2, "fileA"),
        chunk("b1", 3, "fileB"),
        chunk("c1", 4, "fileC"),
        chunk("a2", 5, "fileA"),
        chunk("d2", 6, "fileD"),
    ];
    let out = filter.filter(&session, candidates).await;
    assert_eq!(ids(&out), vec!["d1", "a1", "c1", "a2", "d2"]);
}

#[tokio::test]
async fn unresolvable_chunk_is_treated_as_denied() {
    let authz = Arc::new(ScriptedAuthz::default().rule("alice", "fileA", Rule::Allow));
    let filter = filter_with(authz.clone(), FilterPolicy::default());
    let session = session(&filter, "alice");

    let filtered = filter
        .filter_with_report(&session, vec![orphan("x1", 1), chunk("a1", 2, "fileA")])
        .await;
    assert_eq!(ids(&filtered.chunks), vec!["a1"]);
    assert_eq!(filtered.report.not_found, 1);
    assert_eq!(authz.total_calls(), 1);
}

#[tokio::test]
async fn empty_candidates_issue_no_checks() {
    let authz = Arc::new(ScriptedAuthz::default());
    let filter = filter_with(authz.clone(), FilterPolicy::default());
    let session = session(&filter, "alice");

    let filtered = filter.filter_with_report(&session, Vec::new()).await;
    assert!(filtered.chunks.is_empty());
    assert_eq!(filtered.report.candidates, 0);
    assert_eq!(authz.total_calls(), 0);
}

#[tokio::test]
async fn sessions_do_not_share_decisions() {
    let authz = Arc::new(
        ScriptedAuthz::default()
            .rule("alice", "fileA", Rule::Allow)
            .rule("bob", "fileA", Rule::Deny),
    );
    let filter = filter_with(authz.clone(), FilterPolicy::default());
    let alice = session(&filter, "alice");
    let bob = session(&filter, "bob");

    let candidates = vec![chunk("a1", 1, "fileA")];
    assert_eq!(ids(&filter.filter(&alice, candidates.clone()).await), vec!["a1"]);
    assert!(filter.filter(&bob, candidates).await.is_empty());
    assert_eq!(authz.calls_for("alice", "fileA"), 1);
    assert_eq!(authz.calls_for("bob", "fileA"), 1);
    assert_ne!(alice.id(), bob.id());
}

#[tokio::test]
async fn repeated_calls_are_idempotent_and_cached() {
    let authz = Arc::new(
        ScriptedAuthz::default()
            .rule("alice", "fileA", Rule::Allow)
            .rule("alice", "fileB", Rule::Deny),
    );
    let filter = filter_with(authz.clone(), FilterPolicy::default());
    let session = session(&filter, "alice");
    let candidates = vec![
        chunk("b1", 1, "fileB"),
        chunk("a1", 2, "fileA"),
        chunk("b2", 3, "fileB"),
    ];

    let first = filter.filter(&session, candidates.clone()).await;
    for _ in 0..3 {
        let again = filter.filter(&session, candidates.clone()).await;
        assert_eq!(again, first);
        assert!(again.iter().all(|chunk| chunk.metadata["id"] != "fileB"));
    }
    assert_eq!(ids(&first), vec!["a1"]);
    assert_eq!(authz.total_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_calls_in_one_session_coalesce() {
    let authz = Arc::new(
        ScriptedAuthz::default().rule("alice", "fileA", Rule::Slow(Duration::from_millis(200))),
    );
    let filter = filter_with(authz.clone(), FilterPolicy::default());
    let session = session(&filter, "alice");
    let candidates = vec![chunk("a1", 1, "fileA")];

    let (left, right) = tokio::join!(
        filter.filter(&session, candidates.clone()),
        filter.filter(&session, candidates.clone())
    );
    assert_eq!(ids(&left), vec!["a1"]);
    assert_eq!(left, right);
    assert_eq!(authz.calls_for("alice", "fileA"), 1);
}

#[tokio::test(start_paused = true)]
async fn hung_check_times_out_and_is_excluded() {
    let authz = Arc::new(
        ScriptedAuthz::default()
            .rule("alice", "fileA", Rule::Allow)
            .rule("alice", "fileB", Rule::Hang),
    );
    let policy = FilterPolicy {
        check_timeout: Duration::from_secs(1),
        call_deadline: Duration::from_secs(10),
        ..FilterPolicy::default()
    };
    let filter = filter_with(authz, policy);
    let session = session(&filter, "alice");

    let filtered = filter
        .filter_with_report(&session, vec![chunk("b1", 1, "fileB"), chunk("a1", 2, "fileA")])
        .await;
    assert_eq!(ids(&filtered.chunks), vec!["a1"]);
    assert_eq!(filtered.report.failed.get(&FailureKind::Timeout), Some(&1));
    assert_eq!(filtered.report.deadline_exceeded, 0);
}

#[tokio::test(start_paused = true)]
async fn deadline_returns_partial_result() {
    let slow = Rule::Slow(Duration::from_secs(4));
    let authz = Arc::new(
        ScriptedAuthz::default()
            .rule("alice", "fileA", slow)
            .rule("alice", "fileB", slow)
            .rule("alice", "fileC", slow),
    );
    let policy = FilterPolicy {
        check_timeout: Duration::from_secs(5),
        call_deadline: Duration::from_secs(6),
        concurrency: 1,
        ..FilterPolicy::default()
    };
    let filter = filter_with(authz, policy);
    let session = session(&filter, "alice");

    let filtered = filter
        .filter_with_report(
            &session,
            vec![
                chunk("a1", 1, "fileA"),
                chunk("b1", 2, "fileB"),
                chunk("c1", 3, "fileC"),
            ],
        )
        .await;

    assert_eq!(ids(&filtered.chunks), vec!["a1"]);
    assert_eq!(filtered.report.deadline_exceeded, 2);
    assert!(filtered.report.is_degraded());

    let alice = subject("alice");
    let file_b = ResourceId::new("fileB").unwrap();
    assert!(session.cache().get(&alice, Action::Read, &file_b).is_none());
    assert_eq!(session.cache().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn fan_out_respects_concurrency_limit() {
    let mut authz = ScriptedAuthz::default();
    let mut candidates = Vec::new();
    for n in 0..10u32 {
        let resource = format!("file{n}");
        authz = authz.rule("alice", &resource, Rule::Slow(Duration::from_millis(100)));
        candidates.push(chunk(&format!("c{n}"), n + 1, &resource));
    }
    let authz = Arc::new(authz);
    let policy = FilterPolicy {
        concurrency: 3,
        ..FilterPolicy::default()
    };
    let filter = filter_with(authz.clone(), policy);
    let session = session(&filter, "alice");

    let out = filter.filter(&session, candidates).await;
    assert_eq!(out.len(), 10);
    assert!(authz.max_in_flight.load(Ordering::SeqCst) <= 3);
    assert_eq!(authz.total_calls(), 10);
}

#[tokio::test]
async fn exclusions_are_published_once_per_resource() {
    let authz = Arc::new(
        ScriptedAuthz::default()
            .rule("alice", "fileA", Rule::Allow)
            .rule("alice", "fileB", Rule::Deny),
    );
    let filter = filter_with(authz, FilterPolicy::default());
    let mut events = filter.subscribe();
    let session = session(&filter, "alice");

    filter
        .filter(
            &session,
            vec![
                chunk("a1", 1, "fileA"),
                chunk("b1", 2, "fileB"),
                chunk("b2", 3, "fileB"),
                orphan("x1", 4),
            ],
        )
        .await;

    let denied = events.try_recv().unwrap();
    assert_eq!(denied.reason, ExclusionReason::Denied);
    assert_eq!(denied.resource, Some(ResourceId::new("fileB").unwrap()));
    assert_eq!(&denied.session, session.id());

    let missing = events.try_recv().unwrap();
    assert_eq!(missing.reason, ExclusionReason::ResourceNotFound);
    assert_eq!(missing.chunk, Some(ChunkId::new("x1").unwrap()));
    assert!(events.try_recv().is_err());
}

#[test]
fn invalid_policy_is_rejected_at_construction() {
    let policy = FilterPolicy {
        concurrency: 0,
        ..FilterPolicy::default()
    };
    let built = RetrievalFilter::new(
        Arc::new(ScriptedAuthz::default()),
        Arc::new(MetadataResourceIndex::default()),
        policy,
    );
    assert!(built.is_err());
}
