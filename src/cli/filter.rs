use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use scoped_rag::pipeline::offline::load_candidates;
use scoped_rag_core_types::{Chunk, Subject};
use scoped_rag_retrieval_filter::metrics;
use serde_json::json;
use tracing::debug;

use super::context::CliContext;
use super::output::{print_json, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct FilterArgs {
    /// Verified subject (e.g. an email address)
    #[arg(long)]
    pub subject: String,

    /// Ranked candidate chunks (JSON or YAML)
    #[arg(long, value_name = "FILE")]
    pub candidates: PathBuf,

    /// Chunk-to-resource manifest; without it the `id` metadata key is used
    #[arg(long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// File grants for the local authorization adapter
    #[arg(long, value_name = "FILE")]
    pub grants: Option<PathBuf>,
}

pub async fn cmd_filter(args: FilterArgs, ctx: &CliContext) -> Result<()> {
    let subject = Subject::new(args.subject.as_str()).context("Invalid subject")?;
    let candidates = load_candidates(&args.candidates)?;
    let filter = ctx.retrieval_filter(args.grants.as_deref(), args.manifest.as_deref())?;
    let session = filter.open_session(subject)?;

    let chunks = filter.filter(&session, candidates).await;
    debug!(counters = ?metrics::snapshot(), "filter counters");

    match ctx.output() {
        OutputFormat::Json => print_json(&json!({ "chunks": chunks })),
        OutputFormat::Human => {
            if chunks.is_empty() {
                println!("No matching chunks.");
            }
            for chunk in &chunks {
                print_chunk(chunk);
            }
            Ok(())
        }
    }
}

fn print_chunk(chunk: &Chunk) {
    println!("#{} {}", chunk.rank, chunk.id);
    if let Some(name) = chunk.metadata.get("name") {
        println!("  name: {name}");
    }
    println!("  {}", chunk.text.trim());
}
