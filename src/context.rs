//! Context retrieval preview.
//!
//! Queries are posted to the backend, which does all chunking and ranking.
//! This module only shapes the request, validates retrieval settings before
//! they are pushed, and turns results into what the preview shows: highlighted
//! snippets, the markdown block handed to agents, and quality metrics.

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write as _;

use crate::errors::ValidationError;

/// Body of `POST /api/context/search`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ContextQuery {
    pub query: String,
    pub limit: u32,
}

impl ContextQuery {
    pub fn new(query: &str, limit: u32) -> Result<Self, ValidationError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ValidationError::InvalidQuery("query is empty".into()));
        }
        if limit == 0 {
            return Err(ValidationError::InvalidQuery("limit must be at least 1".into()));
        }
        Ok(Self {
            query: query.to_string(),
            limit,
        })
    }
}

/// One ranked chunk returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub chunk_id: i64,
    pub document_id: i64,
    pub filename: String,
    pub content: String,
    pub similarity: f64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl SearchResult {
    /// `metadata.file_type`, or `"unknown"` when the backend did not record one.
    pub fn file_type(&self) -> &str {
        self.metadata
            .get("file_type")
            .and_then(|v| v.as_str())
            .filter(|t| !t.is_empty())
            .unwrap_or("unknown")
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchResult>,
}

/// Retrieval settings exposed at `/api/admin/config`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: u32,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_chunk_size() -> u32 {
    1000
}

fn default_chunk_overlap() -> u32 {
    200
}

fn default_similarity_threshold() -> f64 {
    0.7
}

fn default_max_results() -> u32 {
    10
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            similarity_threshold: default_similarity_threshold(),
            max_results: default_max_results(),
        }
    }
}

impl ContextConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.chunk_size == 0 {
            return Err(ValidationError::InvalidQuery("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ValidationError::InvalidQuery(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ValidationError::InvalidQuery(format!(
                "similarity_threshold {} is outside 0.0-1.0",
                self.similarity_threshold
            )));
        }
        if self.max_results == 0 {
            return Err(ValidationError::InvalidQuery("max_results must be at least 1".into()));
        }
        Ok(())
    }
}

/// How `context search` lays out its results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreviewFormat {
    /// Ranked list with highlighted snippets
    #[default]
    Ranked,
    /// The markdown block agents receive as context
    Markdown,
}

impl std::str::FromStr for PreviewFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ranked" | "list" => Ok(Self::Ranked),
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(format!("unknown preview format '{}' (ranked, markdown)", other)),
        }
    }
}

/// Aggregate quality of one result set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ContextMetrics {
    /// Mean similarity, 0.0-1.0
    pub average_relevance: f64,
    pub total_chars: usize,
    pub unique_sources: usize,
}

impl ContextMetrics {
    /// `None` for an empty result set.
    pub fn from_results(results: &[SearchResult]) -> Option<Self> {
        if results.is_empty() {
            return None;
        }
        let relevance: f64 = results.iter().map(|r| r.similarity).sum();
        let sources: HashSet<i64> = results.iter().map(|r| r.document_id).collect();
        Some(Self {
            average_relevance: relevance / results.len() as f64,
            total_chars: results.iter().map(|r| r.content.chars().count()).sum(),
            unique_sources: sources.len(),
        })
    }
}

/// Render results as the markdown context block handed to agents.
pub fn format_for_agents(query: &str, results: &[SearchResult]) -> String {
    let mut out = format!("# Relevant Context for: {}\n", query.trim());
    for (index, result) in results.iter().enumerate() {
        let _ = write!(
            out,
            "\n## Source {}: {}\n**File Type:** {}\n**Relevance:** {:.1}%\n\n",
            index + 1,
            result.filename,
            result.file_type(),
            result.similarity * 100.0
        );
        let _ = write!(out, "**Content:**\n{}\n\n---\n", result.content);
    }
    out
}

/// A run of result text, flagged when it matches the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment<'a> {
    pub text: &'a str,
    pub matched: bool,
}

/// Split `text` around case-insensitive occurrences of `query`.
///
/// The query is matched literally; an empty query yields one unmatched segment.
pub fn highlight<'a>(text: &'a str, query: &str) -> Vec<Segment<'a>> {
    let query = query.trim();
    if query.is_empty() || text.is_empty() {
        return vec![Segment {
            text,
            matched: false,
        }];
    }
    let Ok(re) = RegexBuilder::new(&regex::escape(query))
        .case_insensitive(true)
        .build()
    else {
        return vec![Segment {
            text,
            matched: false,
        }];
    };

    let mut segments = Vec::new();
    let mut cursor = 0;
    for m in re.find_iter(text) {
        if m.start() > cursor {
            segments.push(Segment {
                text: &text[cursor..m.start()],
                matched: false,
            });
        }
        segments.push(Segment {
            text: m.as_str(),
            matched: true,
        });
        cursor = m.end();
    }
    if cursor < text.len() {
        segments.push(Segment {
            text: &text[cursor..],
            matched: false,
        });
    }
    segments
}

/// First `max_chars` characters, cut on a char boundary.
pub fn snippet(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
