//! Relation tuples and the mapping from source-system file roles.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::AuthzError;

/// Typed reference to a subject or resource in the authorization schema.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

impl EntityRef {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            kind: "user".into(),
            id: id.into(),
        }
    }

    pub fn file(id: impl Into<String>) -> Self {
        Self {
            kind: "file".into(),
            id: id.into(),
        }
    }
}

/// `subject` holds `relation` on `resource`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tuple {
    pub subject: EntityRef,
    pub relation: String,
    pub resource: EntityRef,
}

/// Source-system role to schema relation.
#[derive(Clone, Debug)]
pub struct RoleMapping {
    roles: HashMap<String, String>,
}

impl RoleMapping {
    pub fn new(roles: HashMap<String, String>) -> Self {
        Self { roles }
    }

    pub fn relation_for(&self, role: &str) -> Option<&str> {
        self.roles.get(role).map(String::as_str)
    }
}

impl Default for RoleMapping {
    fn default() -> Self {
        let mut roles = HashMap::new();
        roles.insert("owner".to_string(), "owner".to_string());
        roles.insert("reader".to_string(), "reader".to_string());
        roles.insert("writer".to_string(), "editor".to_string());
        Self { roles }
    }
}

/// One sharing entry on a source file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileGrant {
    pub file_id: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GrantsFile {
    pub version: u32,
    pub grants: Vec<FileGrant>,
}

pub fn tuples_from_grants(grants: &[FileGrant], mapping: &RoleMapping) -> Vec<Tuple> {
    let mut tuples = Vec::with_capacity(grants.len());
    let mut seen = HashSet::with_capacity(grants.len());
    for grant in grants {
        let Some(email) = grant.email.as_deref().filter(|email| !email.is_empty()) else {
            debug!(
                target = "authz-client",
                file = %grant.file_id,
                "skipping grant without an email address"
            );
            continue;
        };
        let Some(relation) = mapping.relation_for(&grant.role) else {
            debug!(
                target = "authz-client",
                file = %grant.file_id,
                role = %grant.role,
                "skipping unmapped role"
            );
            continue;
        };
        let tuple = Tuple {
            subject: EntityRef::user(email),
            relation: relation.to_string(),
            resource: EntityRef::file(grant.file_id.clone()),
        };
        if seen.insert(tuple.clone()) {
            tuples.push(tuple);
        }
    }
    tuples
}

pub fn parse_grants_str(raw: &str) -> Result<GrantsFile, AuthzError> {
    match serde_json::from_str(raw) {
        Ok(grants) => Ok(grants),
        Err(json_err) => serde_yaml::from_str(raw).map_err(|yaml_err| {
            AuthzError::InvalidRequest(format!(
                "failed to deserialize grants: json error: {}; yaml error: {}",
                json_err, yaml_err
            ))
        }),
    }
}

pub fn load_grants_from_path(path: impl AsRef<Path>) -> Result<GrantsFile, AuthzError> {
    let path = path.as_ref();
    let mut buf = String::new();
    File::open(path)
        .and_then(|mut file| file.read_to_string(&mut buf))
        .map_err(|err| {
            AuthzError::InvalidRequest(format!("cannot read {}: {err}", path.display()))
        })?;
    parse_grants_str(&buf)
}
