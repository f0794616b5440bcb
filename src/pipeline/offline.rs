//! File-backed collaborators for running the pipeline without a vector
//! store or a language model.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use scoped_rag_core_types::{Chunk, Subject};
use serde::Deserialize;

use super::{AnswerGenerator, IdentityVerifier, SimilaritySearch};
use crate::errors::PipelineError;

/// Subject that was verified before the process started.
pub struct StaticIdentity {
    subject: Subject,
}

impl StaticIdentity {
    pub fn new(subject: Subject) -> Self {
        Self { subject }
    }
}

#[async_trait]
impl IdentityVerifier for StaticIdentity {
    async fn verify(&self) -> Result<Subject, PipelineError> {
        if self.subject.is_blank() {
            return Err(PipelineError::Identity("subject is empty".into()));
        }
        Ok(self.subject.clone())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CandidateFile {
    Wrapped { chunks: Vec<Chunk> },
    Bare(Vec<Chunk>),
}

/// Parses a ranked candidate list, JSON first with a YAML fallback.
/// Chunks are returned ordered by their `rank`.
pub fn parse_candidates_str(raw: &str) -> Result<Vec<Chunk>, PipelineError> {
    let parsed: CandidateFile = match serde_json::from_str(raw) {
        Ok(file) => file,
        Err(json_err) => serde_yaml::from_str(raw).map_err(|yaml_err| {
            PipelineError::Search(format!(
                "candidate list is neither JSON ({json_err}) nor YAML ({yaml_err})"
            ))
        })?,
    };
    let mut chunks = match parsed {
        CandidateFile::Wrapped { chunks } | CandidateFile::Bare(chunks) => chunks,
    };
    chunks.sort_by_key(|chunk| chunk.rank);
    Ok(chunks)
}

pub fn load_candidates(path: impl AsRef<Path>) -> Result<Vec<Chunk>, PipelineError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .map_err(|err| PipelineError::Search(format!("{}: {err}", path.display())))?;
    parse_candidates_str(&raw)
}

/// Ranks a fixed candidate list by query term overlap.
pub struct CandidateFileSearch {
    chunks: Vec<Chunk>,
}

impl CandidateFileSearch {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        Self { chunks }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        load_candidates(path).map(Self::new)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|term| term.len() > 1)
        .map(str::to_lowercase)
        .collect()
}

fn searchable_text(chunk: &Chunk) -> String {
    let mut text = chunk.text.clone();
    for key in ["name", "summary"] {
        if let Some(value) = chunk.metadata.get(key) {
            text.push(' ');
            text.push_str(value);
        }
    }
    text
}

#[async_trait]
impl SimilaritySearch for CandidateFileSearch {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Chunk>, PipelineError> {
        let wanted = terms(query);
        let mut scored: Vec<(usize, &Chunk)> = self
            .chunks
            .iter()
            .map(|chunk| {
                let overlap = terms(&searchable_text(chunk))
                    .intersection(&wanted)
                    .count();
                (overlap, chunk)
            })
            .collect();
        // Stable: equal overlap keeps the file's rank order.
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(position, (overlap, chunk))| {
                let score = if wanted.is_empty() {
                    0.0
                } else {
                    overlap as f32 / wanted.len() as f32
                };
                let mut ranked = chunk.clone().with_score(score);
                ranked.rank = position as u32 + 1;
                ranked
            })
            .collect())
    }
}

pub const DEFAULT_SUMMARY_CHARS: usize = 300;

/// Renders `Name:` / `Source:` / `Summary:` blocks from the context chunks.
pub struct SnippetAnswerGenerator {
    summary_chars: usize,
}

impl Default for SnippetAnswerGenerator {
    fn default() -> Self {
        Self {
            summary_chars: DEFAULT_SUMMARY_CHARS,
        }
    }
}

impl SnippetAnswerGenerator {
    pub fn with_summary_chars(summary_chars: usize) -> Self {
        Self { summary_chars }
    }

    fn snippet(&self, chunk: &Chunk) -> String {
        let name = chunk
            .metadata
            .get("name")
            .map(String::as_str)
            .unwrap_or_else(|| chunk.id.as_str());
        let source = chunk
            .metadata
            .get("source")
            .map(String::as_str)
            .unwrap_or("unknown");
        let content = chunk
            .metadata
            .get("summary")
            .filter(|summary| !summary.trim().is_empty())
            .unwrap_or(&chunk.text);
        format!(
            "Name: {name}\nSource: {source}\nSummary: {}",
            truncate(content.trim(), self.summary_chars)
        )
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", text[..cut].trim_end()),
        None => text.to_string(),
    }
}

#[async_trait]
impl AnswerGenerator for SnippetAnswerGenerator {
    async fn answer(&self, _question: &str, context: &[Chunk]) -> Result<String, PipelineError> {
        Ok(context
            .iter()
            .map(|chunk| self.snippet(chunk))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}
