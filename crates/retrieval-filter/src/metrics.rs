use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::report::ExclusionReason;

#[derive(Default)]
struct Counters {
    filter_calls: AtomicU64,
    checks_issued: AtomicU64,
    allowed: AtomicU64,
    denied: AtomicU64,
    failed: AtomicU64,
    not_found: AtomicU64,
    deadline_exceeded: AtomicU64,
}

static COUNTERS: Lazy<Counters> = Lazy::new(Counters::default);

fn increment(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

pub fn record_filter_call() {
    increment(&COUNTERS.filter_calls, 1);
}

pub fn record_check_issued() {
    increment(&COUNTERS.checks_issued, 1);
}

pub fn record_allowed(chunks: usize) {
    increment(&COUNTERS.allowed, chunks as u64);
}

pub fn record_exclusion(reason: ExclusionReason) {
    let counter = match reason {
        ExclusionReason::Denied => &COUNTERS.denied,
        ExclusionReason::Failed(_) => &COUNTERS.failed,
        ExclusionReason::ResourceNotFound => &COUNTERS.not_found,
        ExclusionReason::DeadlineExceeded => &COUNTERS.deadline_exceeded,
    };
    increment(counter, 1);
}

#[derive(Clone, Debug, Default)]
pub struct FilterMetricsSnapshot {
    pub filter_calls: u64,
    pub checks_issued: u64,
    pub allowed: u64,
    pub denied: u64,
    pub failed: u64,
    pub not_found: u64,
    pub deadline_exceeded: u64,
}

pub fn snapshot() -> FilterMetricsSnapshot {
    FilterMetricsSnapshot {
        filter_calls: COUNTERS.filter_calls.load(Ordering::Relaxed),
        checks_issued: COUNTERS.checks_issued.load(Ordering::Relaxed),
        allowed: COUNTERS.allowed.load(Ordering::Relaxed),
        denied: COUNTERS.denied.load(Ordering::Relaxed),
        failed: COUNTERS.failed.load(Ordering::Relaxed),
        not_found: COUNTERS.not_found.load(Ordering::Relaxed),
        deadline_exceeded: COUNTERS.deadline_exceeded.load(Ordering::Relaxed),
    }
}
