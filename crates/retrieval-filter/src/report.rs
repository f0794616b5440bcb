use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use scoped_rag_core_types::{Chunk, FailureKind};
use serde::Serialize;

/// Why a candidate was dropped. Operator-facing only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "reason", content = "kind", rename_all = "snake_case")]
pub enum ExclusionReason {
    Denied,
    Failed(FailureKind),
    ResourceNotFound,
    DeadlineExceeded,
}

impl ExclusionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExclusionReason::Denied => "denied",
            ExclusionReason::Failed(_) => "failed",
            ExclusionReason::ResourceNotFound => "resource_not_found",
            ExclusionReason::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::Failed(kind) => write!(f, "failed:{kind}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Counts for one `filter` call, in chunks unless noted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FilterReport {
    pub candidates: usize,
    /// Distinct resources among resolvable candidates.
    pub distinct_resources: usize,
    pub allowed: usize,
    pub denied: usize,
    pub not_found: usize,
    pub deadline_exceeded: usize,
    pub failed: HashMap<FailureKind, usize>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl FilterReport {
    pub(crate) fn new(candidates: usize) -> Self {
        Self {
            candidates,
            ..Self::default()
        }
    }

    pub(crate) fn record(&mut self, reason: ExclusionReason) {
        match reason {
            ExclusionReason::Denied => self.denied += 1,
            ExclusionReason::ResourceNotFound => self.not_found += 1,
            ExclusionReason::DeadlineExceeded => self.deadline_exceeded += 1,
            ExclusionReason::Failed(kind) => *self.failed.entry(kind).or_default() += 1,
        }
    }

    pub fn excluded(&self) -> usize {
        self.candidates - self.allowed
    }

    pub fn failed_total(&self) -> usize {
        self.failed.values().sum()
    }

    /// True when the result may be smaller than the subject's real access
    /// because the decision service failed or the deadline hit.
    pub fn is_degraded(&self) -> bool {
        self.failed_total() > 0 || self.deadline_exceeded > 0
    }
}

/// Allowed chunks plus the operator report.
#[derive(Clone, Debug)]
pub struct Filtered {
    pub chunks: Vec<Chunk>,
    pub report: FilterReport,
}
