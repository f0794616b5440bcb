//! Scoped RAG library
//!
//! Configuration and the retrieval pipeline around the identity-scoped
//! filter. The filter itself lives in `scoped-rag-retrieval-filter`.

pub mod config;
pub mod errors;
pub mod pipeline;

pub use config::{load_config, AppConfig, LoadOptions, LoadedConfig};
pub use errors::{ConfigError, PipelineError};
pub use pipeline::{
    AnswerGenerator, IdentityVerifier, RetrievalPipeline, SimilaritySearch,
    NO_RELEVANT_INFORMATION,
};
