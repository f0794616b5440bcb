use anyhow::{Context, Result};
use serde_json::json;

use super::context::CliContext;
use super::output::{print_json, OutputFormat};

pub fn cmd_info(ctx: &CliContext) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    let build_date = option_env!("BUILD_DATE").unwrap_or("unknown");
    let git_hash = option_env!("GIT_HASH").unwrap_or("unknown");
    let source = ctx
        .config_source()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "(defaults)".to_string());

    match ctx.output() {
        OutputFormat::Json => print_json(&json!({
            "version": version,
            "build_date": build_date,
            "git_hash": git_hash,
            "config_source": source,
            "config": ctx.config(),
        })),
        OutputFormat::Human => {
            println!("Scoped RAG System Information");
            println!("=============================");
            println!("Version: {version}");
            println!("Build Date: {build_date}");
            println!("Git Commit: {git_hash}");
            println!();
            println!("Configuration ({source}):");
            let rendered =
                serde_yaml::to_string(ctx.config()).context("Failed to render configuration")?;
            for line in rendered.lines() {
                println!("  {line}");
            }
            Ok(())
        }
    }
}
