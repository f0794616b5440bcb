use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use scoped_rag_authz_client::{load_grants_from_path, tuples_from_grants, RoleMapping, TupleWriter};
use serde_json::json;
use tracing::info;

use super::context::CliContext;
use super::output::{print_json, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct SyncArgs {
    /// File sharing grants exported from the document source (JSON or YAML)
    #[arg(long, value_name = "FILE")]
    pub grants: PathBuf,

    /// Print the tuples instead of writing them
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn cmd_sync_permissions(args: SyncArgs, ctx: &CliContext) -> Result<()> {
    let grants = load_grants_from_path(&args.grants)
        .with_context(|| format!("Failed to load grants from {}", args.grants.display()))?;
    let tuples = tuples_from_grants(&grants.grants, &RoleMapping::default());
    let skipped = grants.grants.len().saturating_sub(tuples.len());

    if !args.dry_run {
        let client = ctx.http_client()?;
        client
            .create_tuples(&tuples)
            .await
            .context("Failed to write relation tuples")?;
        info!(
            endpoint = %client.endpoint(),
            written = tuples.len(),
            "relation tuples written"
        );
    }

    match ctx.output() {
        OutputFormat::Json => print_json(&json!({
            "tuples": tuples,
            "skipped": skipped,
            "written": !args.dry_run,
        })),
        OutputFormat::Human => {
            for tuple in &tuples {
                println!(
                    "{}:{} {} {}:{}",
                    tuple.subject.kind,
                    tuple.subject.id,
                    tuple.relation,
                    tuple.resource.kind,
                    tuple.resource.id
                );
            }
            let verb = if args.dry_run { "would write" } else { "wrote" };
            println!("{verb} {} tuples ({skipped} grants skipped)", tuples.len());
            Ok(())
        }
    }
}
