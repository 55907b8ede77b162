//! Typed results returned by the source adapters.
//!
//! Each source gets its own shape carrying only what its scorer consumes.

use crate::types::SourceType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One local knowledge match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeMatch {
    pub answer: String,
    /// Similarity score in [0, 1]
    pub score: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl KnowledgeMatch {
    pub fn new(answer: impl Into<String>, score: f64) -> Self {
        Self {
            answer: answer.into(),
            score,
            metadata: BTreeMap::new(),
        }
    }
}

/// One authoritative documentation article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocsArticle {
    pub title: String,
    pub snippet: String,
    pub url: String,
    pub relevance: f64,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

/// Authoritative docs search response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocsSearchResult {
    pub articles: Vec<DocsArticle>,
    pub overall_confidence: f64,
}

/// One web search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebHit {
    pub title: String,
    pub snippet: String,
    pub url: String,
    pub domain: String,
    pub relevance: f64,
}

/// Web search response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebSearchResult {
    pub hits: Vec<WebHit>,
    pub overall_confidence: f64,
}

/// What one stage's adapter returned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum StageOutput {
    LocalKnowledge { matches: Vec<KnowledgeMatch> },
    LanguageModel { text: String },
    AuthoritativeDocs { result: DocsSearchResult },
    WebSearch { result: WebSearchResult },
}

impl StageOutput {
    pub fn source(&self) -> SourceType {
        match self {
            StageOutput::LocalKnowledge { .. } => SourceType::LocalKnowledge,
            StageOutput::LanguageModel { .. } => SourceType::LanguageModel,
            StageOutput::AuthoritativeDocs { .. } => SourceType::AuthoritativeDocs,
            StageOutput::WebSearch { .. } => SourceType::WebSearch,
        }
    }

    /// Text answer this output contributes to the run
    pub fn answer_text(&self) -> String {
        match self {
            StageOutput::LocalKnowledge { matches } => matches
                .iter()
                .fold(None::<&KnowledgeMatch>, |best, m| match best {
                    Some(b) if b.score >= m.score => Some(b),
                    _ => Some(m),
                })
                .map(|m| m.answer.trim().to_string())
                .unwrap_or_default(),
            StageOutput::LanguageModel { text } => text.trim().to_string(),
            StageOutput::AuthoritativeDocs { result } => {
                join_snippets(result.articles.iter().map(|a| a.snippet.as_str()))
            }
            StageOutput::WebSearch { result } => {
                join_snippets(result.hits.iter().map(|h| h.snippet.as_str()))
            }
        }
    }

    pub fn result_count(&self) -> usize {
        match self {
            StageOutput::LocalKnowledge { matches } => matches.len(),
            StageOutput::LanguageModel { text } => usize::from(!text.trim().is_empty()),
            StageOutput::AuthoritativeDocs { result } => result.articles.len(),
            StageOutput::WebSearch { result } => result.hits.len(),
        }
    }
}

fn join_snippets<'a>(snippets: impl Iterator<Item = &'a str>) -> String {
    snippets
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
