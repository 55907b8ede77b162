//! Cascading retrieval engine.
//!
//! Queries four knowledge sources in order of increasing cost, scores each
//! answer, stops as soon as one is confident enough and resolves
//! disagreement between sources.
//!
//! ```rust,ignore
//! let settings = EngineConfig::load();
//! let orchestrator = CascadeOrchestrator::new(adapters, &settings)?;
//! let result = orchestrator
//!     .execute(CascadeRequest::new("DNS not resolving"), &CancellationToken::new())
//!     .await?;
//! println!("{} ({})", result.answer, result.stopped_at);
//! ```

pub mod adapters;
pub mod circuit;
pub mod config;
pub mod health;
pub mod metrics;
pub mod orchestrator;

pub use adapters::fake::{FakeAdapters, FakeAdaptersBuilder, FakeOutcome};
pub use adapters::{
    AdapterSet, AuthoritativeDocsSource, ConversationContext, LanguageModelSource,
    LocalKnowledgeSource, WebSearchSource,
};
pub use circuit::{
    Admission, BreakerPermit, BreakerStats, CircuitBreaker, CircuitBreakers, CircuitState,
    FailureKind,
};
pub use config::{BreakerConfig, EngineConfig, LoggingConfig};
pub use health::{HealthReport, HealthStatus, StageHealth};
pub use metrics::{CascadeMetrics, MetricsSnapshot};
pub use orchestrator::{CascadeOrchestrator, SelectionPath};
