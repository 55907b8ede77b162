//! Scenario files: what each scripted source answers.
//!
//! ```json
//! {
//!   "query": "DNS not resolving",
//!   "language_model": { "respond": "Check that systemd-resolved is running." },
//!   "authoritative_docs": { "fail": "connection refused" },
//!   "web_search": "hang",
//!   "delays_ms": { "LanguageModel": 25 }
//! }
//! ```

use anyhow::{Context, Result};
use cascade_engine::{FakeAdapters, FakeAdaptersBuilder, FakeOutcome};
use cascade_shared::{
    AdapterError, CascadeConfiguration, CascadeRequest, DocsSearchResult, KnowledgeMatch,
    SourceType, WebSearchResult,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Scripted behaviour of one source
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scripted<T> {
    Respond(T),
    /// Adapter error carrying this message
    Fail(String),
    /// Never answers
    Hang,
}

impl<T> Scripted<T> {
    fn into_outcome(self) -> FakeOutcome<T> {
        match self {
            Scripted::Respond(value) => FakeOutcome::Respond(value),
            Scripted::Fail(message) => FakeOutcome::Fail(AdapterError::Provider(message)),
            Scripted::Hang => FakeOutcome::Hang,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub query: String,

    #[serde(default = "default_session")]
    pub session_id: String,

    /// Per-call configuration override
    #[serde(default)]
    pub config: Option<CascadeConfiguration>,

    #[serde(default)]
    pub local_knowledge: Option<Scripted<Vec<KnowledgeMatch>>>,

    #[serde(default)]
    pub language_model: Option<Scripted<String>>,

    #[serde(default)]
    pub authoritative_docs: Option<Scripted<DocsSearchResult>>,

    #[serde(default)]
    pub web_search: Option<Scripted<WebSearchResult>>,

    #[serde(default = "default_healthy")]
    pub docs_healthy: bool,

    #[serde(default = "default_healthy")]
    pub web_healthy: bool,

    #[serde(default)]
    pub delays_ms: BTreeMap<SourceType, u64>,
}

fn default_session() -> String {
    "cascade-sim".to_string()
}

fn default_healthy() -> bool {
    true
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("Invalid scenario {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Fake adapters scripted by this scenario; unscripted sources return nothing
    pub fn fakes(&self) -> FakeAdapters {
        let mut builder = FakeAdaptersBuilder::new()
            .docs_healthy(self.docs_healthy)
            .web_healthy(self.web_healthy);
        if let Some(script) = &self.local_knowledge {
            builder = builder.local_outcome(script.clone().into_outcome());
        }
        if let Some(script) = &self.language_model {
            builder = builder.language_model_outcome(script.clone().into_outcome());
        }
        if let Some(script) = &self.authoritative_docs {
            builder = builder.docs_outcome(script.clone().into_outcome());
        }
        if let Some(script) = &self.web_search {
            builder = builder.web_outcome(script.clone().into_outcome());
        }
        for (source, ms) in &self.delays_ms {
            builder = builder.delay(*source, Duration::from_millis(*ms));
        }
        builder.build()
    }

    pub fn request(&self) -> CascadeRequest {
        let request = CascadeRequest::new(self.query.as_str()).with_session(self.session_id.as_str());
        match &self.config {
            Some(config) => request.with_config(config.clone()),
            None => request,
        }
    }
}
