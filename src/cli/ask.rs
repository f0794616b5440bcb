use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use scoped_rag::pipeline::{
    CandidateFileSearch, RetrievalPipeline, SnippetAnswerGenerator, StaticIdentity, DEFAULT_TOP_K,
};
use scoped_rag_core_types::Subject;
use serde_json::json;

use super::context::CliContext;
use super::output::{print_json, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct AskArgs {
    /// Verified subject (e.g. an email address)
    #[arg(long)]
    pub subject: String,

    /// Question to answer
    #[arg(long, short = 'q')]
    pub question: String,

    /// Candidate chunks standing in for the vector store (JSON or YAML)
    #[arg(long, value_name = "FILE")]
    pub candidates: PathBuf,

    /// Chunk-to-resource manifest; without it the `id` metadata key is used
    #[arg(long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// File grants for the local authorization adapter
    #[arg(long, value_name = "FILE")]
    pub grants: Option<PathBuf>,

    /// Number of candidates taken from similarity search
    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,
}

pub async fn cmd_ask(args: AskArgs, ctx: &CliContext) -> Result<()> {
    let subject = Subject::new(args.subject.as_str()).context("Invalid subject")?;
    let search = CandidateFileSearch::from_path(&args.candidates)?;
    let filter = ctx.retrieval_filter(args.grants.as_deref(), args.manifest.as_deref())?;

    let pipeline = RetrievalPipeline::new(
        Arc::new(search),
        Arc::new(filter),
        Arc::new(SnippetAnswerGenerator::default()),
    )
    .with_top_k(args.top_k);
    let session = pipeline.login(&StaticIdentity::new(subject)).await?;
    let answer = pipeline.ask(&session, &args.question).await?;

    match ctx.output() {
        OutputFormat::Json => print_json(&json!({
            "question": args.question,
            "answer": answer,
        })),
        OutputFormat::Human => {
            println!("{answer}");
            Ok(())
        }
    }
}
