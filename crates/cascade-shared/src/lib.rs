//! Shared types and scoring for the cascading retrieval engine.
//!
//! Everything here is synchronous and free of I/O: the data model, the
//! cascade configuration, typed adapter results, lexicons, confidence
//! scoring and conflict detection.

pub mod confidence;
pub mod config;
pub mod conflict;
pub mod error;
pub mod lexicon;
pub mod sources;
pub mod types;

pub use confidence::{ConfidenceScore, ConfidenceScorer};
pub use config::{CascadeConfiguration, StageThresholds};
pub use conflict::{
    jaccard_similarity, ConflictAnalysis, ConflictSeverity, ResolutionStrategy, SourceAnswer,
};
pub use error::{AdapterError, CascadeError, ConfigError};
pub use lexicon::Lexicon;
pub use sources::{
    DocsArticle, DocsSearchResult, KnowledgeMatch, StageOutput, WebHit, WebSearchResult,
};
pub use types::{
    CascadeRequest, CascadeResult, CascadeStage, SourceType, StageExecution,
    NO_INFORMATION_ANSWER,
};
