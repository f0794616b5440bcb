//! Primitives shared by every stage of identity-scoped retrieval.
//!
//! Identifiers are opaque strings. Nothing in this crate interprets them
//! beyond rejecting empty values at construction time.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde-full", serde(transparent))]
        #[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Result<Self, TypeError> {
                let raw = raw.into();
                if raw.trim().is_empty() {
                    return Err(TypeError::Empty($label));
                }
                Ok(Self(raw))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True when the value was produced by deserialization of an empty
            /// string and never went through [`Self::new`].
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

opaque_id!(
    /// Authenticated caller, e.g. a verified email or account id.
    Subject,
    "subject"
);
opaque_id!(
    /// Access-controlled object in the source system (a file id).
    ResourceId,
    "resource"
);
opaque_id!(ChunkId, "chunk id");

/// Identifies one query session. A new login gets a new id and a fresh cache.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "lowercase"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Action {
    Read,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A retrievable unit of text produced by ingestion, ranked by similarity search.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    pub id: ChunkId,
    pub rank: u32,
    #[cfg_attr(feature = "serde-full", serde(default))]
    pub score: f32,
    pub text: String,
    #[cfg_attr(feature = "serde-full", serde(default))]
    pub metadata: BTreeMap<String, String>,
}

impl Chunk {
    pub fn new(id: ChunkId, rank: u32, text: impl Into<String>) -> Self {
        Self {
            id,
            rank,
            score: 0.0,
            text: text.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Explicit answer from the decision service.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verdict {
    Allow,
    Deny,
}

/// Why a decision could not be determined. Only ever reported to operators.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FailureKind {
    ServiceUnavailable,
    MalformedDecision,
    Rejected,
    InvalidRequest,
    Timeout,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ServiceUnavailable => "service_unavailable",
            FailureKind::MalformedDecision => "malformed_decision",
            FailureKind::Rejected => "rejected",
            FailureKind::InvalidRequest => "invalid_request",
            FailureKind::Timeout => "timeout",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one (subject, action, resource) check as held by the decision cache.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Decision {
    Allow,
    Deny,
    Error(FailureKind),
}

impl Decision {
    /// Fail-closed: only an explicit allow grants access.
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Decision::Error(_))
    }
}

impl From<Verdict> for Decision {
    fn from(value: Verdict) -> Self {
        match value {
            Verdict::Allow => Decision::Allow,
            Verdict::Deny => Decision::Deny,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_identifiers_are_rejected() {
        assert_eq!(Subject::new("  "), Err(TypeError::Empty("subject")));
        assert_eq!(ResourceId::new(""), Err(TypeError::Empty("resource")));
        assert!(ChunkId::new("c-1").is_ok());
    }

    #[test]
    fn only_allow_is_allow() {
        assert!(Decision::Allow.is_allow());
        assert!(!Decision::Deny.is_allow());
        assert!(!Decision::Error(FailureKind::Timeout).is_allow());
        assert_eq!(Decision::from(Verdict::Deny), Decision::Deny);
    }

    #[cfg(feature = "serde-full")]
    #[test]
    fn chunk_deserializes_with_defaults() {
        let chunk: Chunk =
            serde_json::from_str(r#"{"id":"c-1","rank":1,"text":"hello"}"#).unwrap();
        assert_eq!(chunk.id.as_str(), "c-1");
        assert_eq!(chunk.score, 0.0);
        assert!(chunk.metadata.is_empty());
    }
}
