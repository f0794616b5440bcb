//! Error types for configuration and the retrieval pipeline.

use std::path::PathBuf;

use scoped_rag_retrieval_filter::FilterError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {message}", path.display())]
    Io { path: PathBuf, message: String },
    #[error("failed to parse config {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failures of the collaborators around the filter. Authorization outcomes
/// never appear here; they only shrink the filtered context.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("identity verification failed: {0}")]
    Identity(String),
    #[error("similarity search failed: {0}")]
    Search(String),
    #[error("answer generation failed: {0}")]
    Generation(String),
    #[error(transparent)]
    Session(#[from] FilterError),
}
