//! Clients for the external authorization decision service.
//!
//! Every adapter answers the same binary question: may subject S perform
//! action A on resource R. Callers convert the result into a cached
//! [`Decision`] with [`decision_of`]; anything but an explicit allow is
//! treated as not authorized downstream.

pub mod errors;
pub mod http;
pub mod local;
pub mod policy;
pub mod retry;
pub mod secret;
pub mod tuples;

pub use crate::errors::AuthzError;
pub use crate::http::{HttpAuthorizationClient, HttpClientBuilder, DEFAULT_DOMAIN, DEFAULT_REQUEST_TIMEOUT};
pub use crate::local::LocalAuthorizationClient;
pub use crate::policy::{BackoffCfg, RetryPolicy};
pub use crate::retry::worst_case_duration;
pub use crate::secret::SecretString;
pub use crate::tuples::{
    load_grants_from_path, parse_grants_str, tuples_from_grants, EntityRef, FileGrant, GrantsFile,
    RoleMapping, Tuple,
};

use async_trait::async_trait;
use scoped_rag_core_types::{Action, Decision, ResourceId, Subject, Verdict};

/// Single-decision authorization queries.
#[async_trait]
pub trait AuthorizationClient: Send + Sync {
    async fn check(
        &self,
        subject: &Subject,
        action: Action,
        resource: &ResourceId,
    ) -> Result<Verdict, AuthzError>;
}

/// Writes relation tuples into the decision service's store.
#[async_trait]
pub trait TupleWriter: Send + Sync {
    async fn create_tuples(&self, tuples: &[Tuple]) -> Result<(), AuthzError>;
}

/// Collapse a check result into the cached decision form.
pub fn decision_of(result: Result<Verdict, AuthzError>) -> Decision {
    match result {
        Ok(verdict) => Decision::from(verdict),
        Err(err) => Decision::Error(err.failure_kind()),
    }
}

pub(crate) fn validate_request(subject: &Subject, resource: &ResourceId) -> Result<(), AuthzError> {
    if subject.is_blank() {
        return Err(AuthzError::InvalidRequest("subject is empty".into()));
    }
    if resource.is_blank() {
        return Err(AuthzError::InvalidRequest("resource is empty".into()));
    }
    Ok(())
}
