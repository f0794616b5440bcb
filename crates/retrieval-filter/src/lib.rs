//! Identity-scoped retrieval filter.
//!
//! Sits between similarity search and answer generation. Given a session
//! (subject plus its decision cache) and ranked candidate chunks, it
//! resolves each chunk's resource, authorizes every distinct resource once,
//! and returns the allowed chunks in their original order. Anything short
//! of an explicit allow excludes the chunk, and exclusions are reported only
//! through tracing, the audit channel and [`FilterReport`].

pub mod audit;
pub mod errors;
pub mod filter;
pub mod metrics;
pub mod policy;
pub mod report;
pub mod session;

pub use audit::FilterAuditEvent;
pub use errors::FilterError;
pub use filter::RetrievalFilter;
pub use policy::FilterPolicy;
pub use report::{ExclusionReason, FilterReport, Filtered};
pub use session::FilterSession;
