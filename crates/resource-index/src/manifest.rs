use std::fs;
use std::path::Path;

use scoped_rag_core_types::{ChunkId, ResourceId};
use serde::{Deserialize, Serialize};

use crate::IndexError;

/// Ingestion output: which resource each chunk was cut from.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexManifest {
    pub version: u32,
    pub chunks: Vec<ManifestEntry>,
    #[serde(default)]
    pub removed: Vec<ResourceId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub chunk: ChunkId,
    pub resource: ResourceId,
}

pub fn parse_manifest_str(raw: &str) -> Result<IndexManifest, IndexError> {
    match serde_json::from_str(raw) {
        Ok(manifest) => Ok(manifest),
        Err(json_err) => serde_yaml::from_str(raw).map_err(|yaml_err| {
            IndexError::Manifest(format!(
                "json error: {}; yaml error: {}",
                json_err, yaml_err
            ))
        }),
    }
}

pub fn load_manifest_from_path(path: impl AsRef<Path>) -> Result<IndexManifest, IndexError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .map_err(|err| IndexError::Io(format!("{}: {err}", path.display())))?;
    parse_manifest_str(&raw)
}
