use clap::Subcommand;

use super::ask::AskArgs;
use super::filter::FilterArgs;
use super::index::IndexArgs;
use super::sync::SyncArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Filter a ranked candidate list down to what a subject may read
    Filter(FilterArgs),

    /// Answer a question from the subject's authorized documents only
    Ask(AskArgs),

    /// Map file sharing grants to relation tuples and write them
    SyncPermissions(SyncArgs),

    /// Validate a chunk-to-resource manifest
    Index(IndexArgs),

    /// Show build information and the effective configuration
    Info,
}
