use anyhow::Result;

use super::ask::cmd_ask;
use super::commands::Commands;
use super::context::CliContext;
use super::env::CliArgs;
use super::filter::cmd_filter;
use super::index::cmd_index;
use super::info::cmd_info;
use super::sync::cmd_sync_permissions;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Filter(args) => cmd_filter(args, ctx).await,
        Commands::Ask(args) => cmd_ask(args, ctx).await,
        Commands::SyncPermissions(args) => cmd_sync_permissions(args, ctx).await,
        Commands::Index(args) => cmd_index(args, ctx),
        Commands::Info => cmd_info(ctx),
    }
}
