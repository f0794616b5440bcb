//! Resolves the resource (source file) each retrievable chunk came from.
//!
//! Lookups are pure reads. A chunk whose resource has been removed since
//! indexing resolves to [`IndexError::NotFound`], which callers treat the
//! same as a deny.

pub mod manifest;

pub use manifest::{
    load_manifest_from_path, parse_manifest_str, IndexManifest, ManifestEntry,
};

use std::collections::HashSet;

use dashmap::{DashMap, DashSet};
use scoped_rag_core_types::{Chunk, ChunkId, ResourceId};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("no resource backs chunk {0}")]
    NotFound(ChunkId),
    #[error("invalid manifest: {0}")]
    Manifest(String),
    #[error("io error: {0}")]
    Io(String),
}

pub trait ResourceIndex: Send + Sync {
    fn resource_of(&self, chunk: &Chunk) -> Result<ResourceId, IndexError>;
}

/// Chunk-to-resource table populated by ingestion.
#[derive(Default)]
pub struct ManifestResourceIndex {
    chunks: DashMap<ChunkId, ResourceId>,
    removed: DashSet<ResourceId>,
}

impl ManifestResourceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_manifest(manifest: IndexManifest) -> Result<Self, IndexError> {
        let index = Self::new();
        for entry in manifest.chunks {
            if entry.chunk.is_blank() || entry.resource.is_blank() {
                return Err(IndexError::Manifest(
                    "entries need a non-empty chunk and resource".into(),
                ));
            }
            index.insert(entry.chunk, entry.resource);
        }
        for resource in manifest.removed {
            index.remove_resource(&resource);
        }
        Ok(index)
    }

    pub fn insert(&self, chunk: ChunkId, resource: ResourceId) {
        self.removed.remove(&resource);
        self.chunks.insert(chunk, resource);
    }

    /// Retires a resource; every chunk it backed stops resolving.
    pub fn remove_resource(&self, resource: &ResourceId) {
        self.chunks.retain(|_, backing| *backing != *resource);
        self.removed.insert(resource.clone());
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn resource_count(&self) -> usize {
        self.chunks
            .iter()
            .map(|entry| entry.value().clone())
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }
}

impl ResourceIndex for ManifestResourceIndex {
    fn resource_of(&self, chunk: &Chunk) -> Result<ResourceId, IndexError> {
        let resource = self
            .chunks
            .get(&chunk.id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| IndexError::NotFound(chunk.id.clone()))?;
        if self.removed.contains(&resource) {
            debug!(
                target = "resource-index",
                chunk = %chunk.id,
                resource = %resource,
                "chunk resolves to a removed resource"
            );
            return Err(IndexError::NotFound(chunk.id.clone()));
        }
        Ok(resource)
    }
}

pub const DEFAULT_METADATA_KEY: &str = "id";

/// Reads the resource id that ingestion stored in chunk metadata.
#[derive(Clone, Debug)]
pub struct MetadataResourceIndex {
    key: String,
}

impl MetadataResourceIndex {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Default for MetadataResourceIndex {
    fn default() -> Self {
        Self::new(DEFAULT_METADATA_KEY)
    }
}

impl ResourceIndex for MetadataResourceIndex {
    fn resource_of(&self, chunk: &Chunk) -> Result<ResourceId, IndexError> {
        chunk
            .metadata
            .get(&self.key)
            .and_then(|raw| ResourceId::new(raw.clone()).ok())
            .ok_or_else(|| IndexError::NotFound(chunk.id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str) -> Chunk {
        Chunk::new(ChunkId::new(id).unwrap(), 1, "text")
    }

    fn rid(id: &str) -> ResourceId {
        ResourceId::new(id).unwrap()
    }

    #[test]
    fn resolves_inserted_chunks() {
        let index = ManifestResourceIndex::new();
        index.insert(ChunkId::new("c1").unwrap(), rid("fileA"));
        index.insert(ChunkId::new("c2").unwrap(), rid("fileA"));
        assert_eq!(index.resource_of(&chunk("c1")), Ok(rid("fileA")));
        assert_eq!(index.resource_count(), 1);
        assert_eq!(
            index.resource_of(&chunk("c3")),
            Err(IndexError::NotFound(ChunkId::new("c3").unwrap()))
        );
    }

    #[test]
    fn removed_resources_stop_resolving() {
        let index = ManifestResourceIndex::new();
        index.insert(ChunkId::new("c1").unwrap(), rid("fileA"));
        index.insert(ChunkId::new("c2").unwrap(), rid("fileB"));
        index.remove_resource(&rid("fileA"));
        assert!(matches!(
            index.resource_of(&chunk("c1")),
            Err(IndexError::NotFound(_))
        ));
        assert_eq!(index.resource_of(&chunk("c2")), Ok(rid("fileB")));
        assert_eq!(index.removed_count(), 1);
    }

    #[test]
    fn metadata_index_reads_configured_key() {
        let index = MetadataResourceIndex::default();
        let with_id = chunk("c1").with_metadata("id", "fileA");
        let blank = chunk("c2").with_metadata("id", " ");
        assert_eq!(index.resource_of(&with_id), Ok(rid("fileA")));
        assert!(index.resource_of(&blank).is_err());
        assert!(index.resource_of(&chunk("c3")).is_err());

        let by_source = MetadataResourceIndex::new("file_id");
        let tagged = chunk("c4").with_metadata("file_id", "fileZ");
        assert_eq!(by_source.resource_of(&tagged), Ok(rid("fileZ")));
    }
}
