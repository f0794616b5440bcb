use std::time::SystemTime;

use scoped_rag_core_types::{ChunkId, ResourceId, SessionId, Subject};
use serde::Serialize;

use crate::report::ExclusionReason;

/// Emitted once per excluded resource (or unresolvable chunk) per call.
#[derive(Clone, Debug, Serialize)]
pub struct FilterAuditEvent {
    pub session: SessionId,
    pub subject: Subject,
    pub resource: Option<ResourceId>,
    pub chunk: Option<ChunkId>,
    pub reason: ExclusionReason,
    pub timestamp: SystemTime,
}
