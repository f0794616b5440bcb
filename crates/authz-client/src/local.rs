//! In-process decision adapter backed by a tuple set.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;
use scoped_rag_core_types::{Action, ResourceId, Subject, Verdict};

use crate::errors::AuthzError;
use crate::tuples::Tuple;
use crate::{validate_request, AuthorizationClient, TupleWriter};

const READ_RELATIONS: [&str; 3] = ["owner", "editor", "reader"];

/// (subject id, resource id) to the relations the subject holds on it.
type RelationIndex = HashMap<(String, String), HashSet<String>>;

/// Answers checks from tuples held in memory. Anything not granted is denied.
#[derive(Default)]
pub struct LocalAuthorizationClient {
    relations: RwLock<RelationIndex>,
}

impl LocalAuthorizationClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tuples(tuples: impl IntoIterator<Item = Tuple>) -> Self {
        let client = Self::default();
        client.insert_all(tuples);
        client
    }

    pub fn len(&self) -> usize {
        self.relations.read().values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.read().is_empty()
    }

    fn insert_all(&self, tuples: impl IntoIterator<Item = Tuple>) {
        let mut guard = self.relations.write();
        for tuple in tuples {
            guard
                .entry((tuple.subject.id, tuple.resource.id))
                .or_default()
                .insert(tuple.relation);
        }
    }

    fn relations_for(action: Action) -> &'static [&'static str] {
        match action {
            Action::Read => &READ_RELATIONS,
        }
    }
}

#[async_trait]
impl AuthorizationClient for LocalAuthorizationClient {
    async fn check(
        &self,
        subject: &Subject,
        action: Action,
        resource: &ResourceId,
    ) -> Result<Verdict, AuthzError> {
        validate_request(subject, resource)?;
        let key = (subject.as_str().to_string(), resource.as_str().to_string());
        let allowed = self.relations.read().get(&key).is_some_and(|held| {
            Self::relations_for(action)
                .iter()
                .any(|relation| held.contains(*relation))
        });
        Ok(if allowed { Verdict::Allow } else { Verdict::Deny })
    }
}

#[async_trait]
impl TupleWriter for LocalAuthorizationClient {
    async fn create_tuples(&self, tuples: &[Tuple]) -> Result<(), AuthzError> {
        if tuples.is_empty() {
            return Ok(());
        }
        self.insert_all(tuples.iter().cloned());
        Ok(())
    }
}
