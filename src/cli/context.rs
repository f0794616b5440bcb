use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use scoped_rag::config::{AppConfig, LoadedConfig};
use scoped_rag_authz_client::{
    load_grants_from_path, tuples_from_grants, AuthorizationClient, HttpAuthorizationClient,
    LocalAuthorizationClient, RoleMapping,
};
use scoped_rag_resource_index::{
    load_manifest_from_path, ManifestResourceIndex, MetadataResourceIndex, ResourceIndex,
};
use scoped_rag_retrieval_filter::RetrievalFilter;
use tracing::info;

use super::output::OutputFormat;

pub struct CliContext {
    config: Arc<AppConfig>,
    config_source: Option<PathBuf>,
    output: OutputFormat,
}

impl CliContext {
    pub fn new(loaded: LoadedConfig, output: OutputFormat) -> Self {
        Self {
            config: Arc::new(loaded.config),
            config_source: loaded.source,
            output,
        }
    }

    pub fn config(&self) -> &AppConfig {
        self.config.as_ref()
    }

    pub fn config_source(&self) -> Option<&Path> {
        self.config_source.as_deref()
    }

    pub fn output(&self) -> OutputFormat {
        self.output
    }

    pub fn http_client(&self) -> Result<HttpAuthorizationClient> {
        let authz = &self.config.authz;
        let mut builder = HttpAuthorizationClient::builder()
            .with_domain(authz.domain.clone())
            .with_token(authz.token.clone())
            .with_entity_types(authz.subject_type.clone(), authz.resource_type.clone())
            .with_request_timeout(authz.request_timeout)
            .with_retry(self.config.retry.policy(), self.config.retry.backoff());
        if let Some(endpoint) = authz.endpoint_url()? {
            builder = builder.with_endpoint(endpoint);
        }
        builder
            .build()
            .context("Failed to build authorization client")
    }

    /// Local tuple store seeded from a grants file, or the configured
    /// decision service.
    pub fn authorization_client(&self, grants: Option<&Path>) -> Result<Arc<dyn AuthorizationClient>> {
        match grants {
            Some(path) => {
                let grants = load_grants_from_path(path)
                    .with_context(|| format!("Failed to load grants from {}", path.display()))?;
                let tuples = tuples_from_grants(&grants.grants, &RoleMapping::default());
                info!(
                    path = %path.display(),
                    tuples = tuples.len(),
                    "using local authorization adapter"
                );
                Ok(Arc::new(LocalAuthorizationClient::with_tuples(tuples)))
            }
            None => {
                let client = self.http_client()?;
                info!(endpoint = %client.endpoint(), "using authorization service");
                Ok(Arc::new(client))
            }
        }
    }

    /// Manifest-backed index when given, otherwise chunk metadata.
    pub fn resource_index(&self, manifest: Option<&Path>) -> Result<Arc<dyn ResourceIndex>> {
        match manifest {
            Some(path) => {
                let manifest = load_manifest_from_path(path)
                    .with_context(|| format!("Failed to load manifest from {}", path.display()))?;
                let index = ManifestResourceIndex::from_manifest(manifest)
                    .context("Manifest contains invalid entries")?;
                Ok(Arc::new(index))
            }
            None => Ok(Arc::new(MetadataResourceIndex::default())),
        }
    }

    pub fn retrieval_filter(
        &self,
        grants: Option<&Path>,
        manifest: Option<&Path>,
    ) -> Result<RetrievalFilter> {
        let authz = self.authorization_client(grants)?;
        let index = self.resource_index(manifest)?;
        RetrievalFilter::new(authz, index, self.config.filter.policy())
            .context("Invalid filter policy")
    }
}
