//! Retrieval pipeline glue: identity, similarity search, the filter, answer
//! generation.
//!
//! The filter is the only stage that sees authorization outcomes. When it
//! leaves nothing, the pipeline answers [`NO_RELEVANT_INFORMATION`] whether
//! the cause was a denial or an outage, and the generator is not called.

pub mod offline;

use std::sync::Arc;

use async_trait::async_trait;
use scoped_rag_core_types::{Chunk, Subject};
use scoped_rag_retrieval_filter::{FilterReport, FilterSession, RetrievalFilter};
use tracing::debug;

use crate::errors::PipelineError;

pub use offline::{CandidateFileSearch, SnippetAnswerGenerator, StaticIdentity};

pub const NO_RELEVANT_INFORMATION: &str = "No relevant information found.";

pub const DEFAULT_TOP_K: usize = 5;

/// Produces the verified subject at login.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self) -> Result<Subject, PipelineError>;
}

/// Ranked candidates for a query, unaware of authorization.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Chunk>, PipelineError>;
}

#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn answer(&self, question: &str, context: &[Chunk]) -> Result<String, PipelineError>;
}

#[derive(Clone, Debug)]
pub struct Answer {
    pub text: String,
    /// Operator-facing; never rendered into `text`.
    pub report: FilterReport,
}

pub struct RetrievalPipeline {
    search: Arc<dyn SimilaritySearch>,
    filter: Arc<RetrievalFilter>,
    generator: Arc<dyn AnswerGenerator>,
    top_k: usize,
}

impl RetrievalPipeline {
    pub fn new(
        search: Arc<dyn SimilaritySearch>,
        filter: Arc<RetrievalFilter>,
        generator: Arc<dyn AnswerGenerator>,
    ) -> Self {
        Self {
            search,
            filter,
            generator,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Verifies the caller and opens a fresh session with an empty cache.
    pub async fn login(&self, verifier: &dyn IdentityVerifier) -> Result<FilterSession, PipelineError> {
        let subject = verifier.verify().await?;
        Ok(self.filter.open_session(subject)?)
    }

    pub async fn ask(&self, session: &FilterSession, question: &str) -> Result<String, PipelineError> {
        self.ask_with_report(session, question)
            .await
            .map(|answer| answer.text)
    }

    pub async fn ask_with_report(
        &self,
        session: &FilterSession,
        question: &str,
    ) -> Result<Answer, PipelineError> {
        let candidates = self.search.search(question, self.top_k).await?;
        debug!(
            target = "pipeline",
            session = %session.id(),
            candidates = candidates.len(),
            "similarity search returned"
        );
        let filtered = self.filter.filter_with_report(session, candidates).await;
        let text = if filtered.chunks.is_empty() {
            NO_RELEVANT_INFORMATION.to_string()
        } else {
            self.generator.answer(question, &filtered.chunks).await?
        };
        Ok(Answer {
            text,
            report: filtered.report,
        })
    }
}
