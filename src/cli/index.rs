use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use scoped_rag_resource_index::{load_manifest_from_path, ManifestResourceIndex};
use serde_json::json;

use super::context::CliContext;
use super::output::{print_json, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct IndexArgs {
    /// Chunk-to-resource manifest produced at ingestion (JSON or YAML)
    #[arg(long, value_name = "FILE")]
    pub manifest: PathBuf,
}

pub fn cmd_index(args: IndexArgs, ctx: &CliContext) -> Result<()> {
    let manifest = load_manifest_from_path(&args.manifest)
        .with_context(|| format!("Failed to load manifest from {}", args.manifest.display()))?;
    let version = manifest.version;
    let index =
        ManifestResourceIndex::from_manifest(manifest).context("Manifest contains invalid entries")?;

    match ctx.output() {
        OutputFormat::Json => print_json(&json!({
            "version": version,
            "chunks": index.chunk_count(),
            "resources": index.resource_count(),
            "removed": index.removed_count(),
        })),
        OutputFormat::Human => {
            println!("Manifest v{version}: {}", args.manifest.display());
            println!("- Chunks: {}", index.chunk_count());
            println!("- Resources: {}", index.resource_count());
            println!("- Removed resources: {}", index.removed_count());
            Ok(())
        }
    }
}
