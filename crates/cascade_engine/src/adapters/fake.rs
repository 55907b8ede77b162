//! Scripted adapters for deterministic testing and simulation.
//!
//! Each fake replays a pre-configured outcome after an optional delay and
//! counts its calls, so tests can assert which stages actually ran.
//!
//! ```rust,ignore
//! let fakes = FakeAdaptersBuilder::new()
//!     .local_matches(vec![KnowledgeMatch::new("Use resolvectl", 0.9)])
//!     .language_model_error("connection refused")
//!     .build();
//!
//! let orchestrator = CascadeOrchestrator::new(fakes.adapters(), &EngineConfig::default())?;
//! assert_eq!(fakes.call_count(SourceType::LanguageModel), 0);
//! ```

use super::{
    AdapterSet, AuthoritativeDocsSource, ConversationContext, LanguageModelSource,
    LocalKnowledgeSource, WebSearchSource,
};
use async_trait::async_trait;
use cascade_shared::{
    AdapterError, DocsArticle, DocsSearchResult, KnowledgeMatch, SourceType, WebHit,
    WebSearchResult,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What a fake adapter does when called
#[derive(Debug, Clone)]
pub enum FakeOutcome<T> {
    Respond(T),
    Fail(AdapterError),
    /// Never completes, so the stage timeout fires
    Hang,
}

#[derive(Debug, Clone)]
struct Script<T> {
    outcome: FakeOutcome<T>,
    delay: Duration,
}

impl<T: Clone> Script<T> {
    fn respond(value: T) -> Self {
        Self {
            outcome: FakeOutcome::Respond(value),
            delay: Duration::ZERO,
        }
    }

    async fn play(&self, calls: &AtomicUsize) -> Result<T, AdapterError> {
        calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.outcome {
            FakeOutcome::Respond(value) => Ok(value.clone()),
            FakeOutcome::Fail(err) => Err(err.clone()),
            FakeOutcome::Hang => std::future::pending().await,
        }
    }
}

// ============================================================================
// Fake adapters
// ============================================================================

pub struct FakeLocalKnowledge {
    script: Script<Vec<KnowledgeMatch>>,
    calls: AtomicUsize,
}

#[async_trait]
impl LocalKnowledgeSource for FakeLocalKnowledge {
    async fn search(
        &self,
        _query: &str,
        top_k: usize,
        min_score: f64,
    ) -> Result<Vec<KnowledgeMatch>, AdapterError> {
        let mut matches = self.script.play(&self.calls).await?;
        matches.retain(|m| m.score >= min_score);
        matches.truncate(top_k);
        Ok(matches)
    }
}

pub struct FakeLanguageModel {
    script: Script<String>,
    calls: AtomicUsize,
}

#[async_trait]
impl LanguageModelSource for FakeLanguageModel {
    async fn complete(
        &self,
        _query: &str,
        _context: &ConversationContext,
    ) -> Result<String, AdapterError> {
        self.script.play(&self.calls).await
    }
}

pub struct FakeAuthoritativeDocs {
    script: Script<DocsSearchResult>,
    healthy: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl AuthoritativeDocsSource for FakeAuthoritativeDocs {
    async fn search(
        &self,
        _query: &str,
        max_results: usize,
    ) -> Result<DocsSearchResult, AdapterError> {
        let mut result = self.script.play(&self.calls).await?;
        result.articles.truncate(max_results);
        Ok(result)
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }
}

pub struct FakeWebSearch {
    script: Script<WebSearchResult>,
    healthy: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl WebSearchSource for FakeWebSearch {
    async fn search(&self, _query: &str, max_results: usize) -> Result<WebSearchResult, AdapterError> {
        let mut result = self.script.play(&self.calls).await?;
        result.hits.truncate(max_results);
        Ok(result)
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }
}

/// The four fakes, kept so tests can inspect call counts
#[derive(Clone)]
pub struct FakeAdapters {
    pub local_knowledge: Arc<FakeLocalKnowledge>,
    pub language_model: Arc<FakeLanguageModel>,
    pub authoritative_docs: Arc<FakeAuthoritativeDocs>,
    pub web_search: Arc<FakeWebSearch>,
}

impl FakeAdapters {
    /// Adapter set backed by these fakes
    pub fn adapters(&self) -> AdapterSet {
        AdapterSet::new(
            self.local_knowledge.clone(),
            self.language_model.clone(),
            self.authoritative_docs.clone(),
            self.web_search.clone(),
        )
    }

    pub fn call_count(&self, source: SourceType) -> usize {
        let calls = match source {
            SourceType::LocalKnowledge => &self.local_knowledge.calls,
            SourceType::LanguageModel => &self.language_model.calls,
            SourceType::AuthoritativeDocs => &self.authoritative_docs.calls,
            SourceType::WebSearch => &self.web_search.calls,
        };
        calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        SourceType::ALL.iter().map(|s| self.call_count(*s)).sum()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for `FakeAdapters`. Every source starts out returning nothing.
pub struct FakeAdaptersBuilder {
    local_knowledge: Script<Vec<KnowledgeMatch>>,
    language_model: Script<String>,
    authoritative_docs: Script<DocsSearchResult>,
    web_search: Script<WebSearchResult>,
    docs_healthy: bool,
    web_healthy: bool,
}

impl FakeAdaptersBuilder {
    pub fn new() -> Self {
        Self {
            local_knowledge: Script::respond(vec![]),
            language_model: Script::respond(String::new()),
            authoritative_docs: Script::respond(DocsSearchResult::default()),
            web_search: Script::respond(WebSearchResult::default()),
            docs_healthy: true,
            web_healthy: true,
        }
    }

    pub fn local_matches(mut self, matches: Vec<KnowledgeMatch>) -> Self {
        self.local_knowledge.outcome = FakeOutcome::Respond(matches);
        self
    }

    pub fn local_outcome(mut self, outcome: FakeOutcome<Vec<KnowledgeMatch>>) -> Self {
        self.local_knowledge.outcome = outcome;
        self
    }

    pub fn language_model_answer(mut self, answer: &str) -> Self {
        self.language_model.outcome = FakeOutcome::Respond(answer.to_string());
        self
    }

    pub fn language_model_error(mut self, message: &str) -> Self {
        self.language_model.outcome = FakeOutcome::Fail(AdapterError::Provider(message.to_string()));
        self
    }

    pub fn language_model_outcome(mut self, outcome: FakeOutcome<String>) -> Self {
        self.language_model.outcome = outcome;
        self
    }

    pub fn docs_result(mut self, result: DocsSearchResult) -> Self {
        self.authoritative_docs.outcome = FakeOutcome::Respond(result);
        self
    }

    /// Single undated article carrying `snippet` as its text
    pub fn docs_answer(self, snippet: &str, overall_confidence: f64) -> Self {
        self.docs_result(DocsSearchResult {
            articles: vec![DocsArticle {
                title: "Documentation".to_string(),
                snippet: snippet.to_string(),
                url: "https://docs.invalid/article".to_string(),
                relevance: overall_confidence,
                last_modified: None,
            }],
            overall_confidence,
        })
    }

    pub fn docs_outcome(mut self, outcome: FakeOutcome<DocsSearchResult>) -> Self {
        self.authoritative_docs.outcome = outcome;
        self
    }

    pub fn docs_healthy(mut self, healthy: bool) -> Self {
        self.docs_healthy = healthy;
        self
    }

    pub fn web_result(mut self, result: WebSearchResult) -> Self {
        self.web_search.outcome = FakeOutcome::Respond(result);
        self
    }

    /// Single hit carrying `snippet` as its text
    pub fn web_answer(self, snippet: &str, overall_confidence: f64) -> Self {
        self.web_result(WebSearchResult {
            hits: vec![WebHit {
                title: "Search result".to_string(),
                snippet: snippet.to_string(),
                url: "https://search.invalid/result".to_string(),
                domain: "search.invalid".to_string(),
                relevance: overall_confidence,
            }],
            overall_confidence,
        })
    }

    pub fn web_outcome(mut self, outcome: FakeOutcome<WebSearchResult>) -> Self {
        self.web_search.outcome = outcome;
        self
    }

    pub fn web_healthy(mut self, healthy: bool) -> Self {
        self.web_healthy = healthy;
        self
    }

    /// Delay before a source answers
    pub fn delay(mut self, source: SourceType, delay: Duration) -> Self {
        match source {
            SourceType::LocalKnowledge => self.local_knowledge.delay = delay,
            SourceType::LanguageModel => self.language_model.delay = delay,
            SourceType::AuthoritativeDocs => self.authoritative_docs.delay = delay,
            SourceType::WebSearch => self.web_search.delay = delay,
        }
        self
    }

    pub fn build(self) -> FakeAdapters {
        FakeAdapters {
            local_knowledge: Arc::new(FakeLocalKnowledge {
                script: self.local_knowledge,
                calls: AtomicUsize::new(0),
            }),
            language_model: Arc::new(FakeLanguageModel {
                script: self.language_model,
                calls: AtomicUsize::new(0),
            }),
            authoritative_docs: Arc::new(FakeAuthoritativeDocs {
                script: self.authoritative_docs,
                healthy: self.docs_healthy,
                calls: AtomicUsize::new(0),
            }),
            web_search: Arc::new(FakeWebSearch {
                script: self.web_search,
                healthy: self.web_healthy,
                calls: AtomicUsize::new(0),
            }),
        }
    }
}

impl Default for FakeAdaptersBuilder {
    fn default() -> Self {
        Self::new()
    }
}
