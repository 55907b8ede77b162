//! Source adapter traits.
//!
//! The four knowledge sources are external collaborators. The orchestrator
//! only sees these narrow async interfaces, so production providers and the
//! scripted fakes in [`fake`] are interchangeable.

pub mod fake;

use async_trait::async_trait;
use cascade_shared::{
    AdapterError, DocsSearchResult, KnowledgeMatch, SourceType, WebSearchResult,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Free-form request context handed to the language model
pub type ConversationContext = BTreeMap<String, Value>;

// ============================================================================
// Adapter traits
// ============================================================================

/// Vector-similarity lookup over the local knowledge base
#[async_trait]
pub trait LocalKnowledgeSource: Send + Sync {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        min_score: f64,
    ) -> Result<Vec<KnowledgeMatch>, AdapterError>;
}

/// Language model completion service
#[async_trait]
pub trait LanguageModelSource: Send + Sync {
    async fn complete(
        &self,
        query: &str,
        context: &ConversationContext,
    ) -> Result<String, AdapterError>;
}

/// Authoritative documentation search
#[async_trait]
pub trait AuthoritativeDocsSource: Send + Sync {
    async fn search(&self, query: &str, max_results: usize)
        -> Result<DocsSearchResult, AdapterError>;

    async fn health_check(&self) -> bool;
}

/// General web search
#[async_trait]
pub trait WebSearchSource: Send + Sync {
    async fn search(&self, query: &str, max_results: usize)
        -> Result<WebSearchResult, AdapterError>;

    async fn health_check(&self) -> bool;
}

// ============================================================================
// Adapter set
// ============================================================================

/// The four adapters one orchestrator runs against
#[derive(Clone)]
pub struct AdapterSet {
    pub local_knowledge: Arc<dyn LocalKnowledgeSource>,
    pub language_model: Arc<dyn LanguageModelSource>,
    pub authoritative_docs: Arc<dyn AuthoritativeDocsSource>,
    pub web_search: Arc<dyn WebSearchSource>,
}

impl AdapterSet {
    pub fn new(
        local_knowledge: Arc<dyn LocalKnowledgeSource>,
        language_model: Arc<dyn LanguageModelSource>,
        authoritative_docs: Arc<dyn AuthoritativeDocsSource>,
        web_search: Arc<dyn WebSearchSource>,
    ) -> Self {
        Self {
            local_knowledge,
            language_model,
            authoritative_docs,
            web_search,
        }
    }

    /// Probe a source; sources without a probe are always reachable
    pub async fn health_check(&self, source: SourceType) -> bool {
        match source {
            SourceType::LocalKnowledge | SourceType::LanguageModel => true,
            SourceType::AuthoritativeDocs => self.authoritative_docs.health_check().await,
            SourceType::WebSearch => self.web_search.health_check().await,
        }
    }
}

impl std::fmt::Debug for AdapterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterSet").finish_non_exhaustive()
    }
}
