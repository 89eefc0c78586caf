//! domainlens core library: semantic indexing of Python accounting code.
//!
//! Source files go through a per-file pipeline (structural extraction,
//! relationship resolution, domain tagging, context scoring and workflow
//! detection) and are merged into one serializable [`SemanticIndex`] that the
//! query engine ranks against free-text questions. Everything is synchronous
//! and deterministic; only [`analyze_project`] fans files out to a Rayon pool.

pub mod config;
pub mod errors;
pub mod indexer;
pub mod models;
pub mod query;
pub mod semantic;

// ---------------------------------------------------------------------------
// Re-exports for the common entry points
// ---------------------------------------------------------------------------

pub use config::AnalysisConfig;
pub use errors::{SemanticError, SemanticResult};
pub use indexer::callgraph::{resolve, CallGraph};
pub use indexer::extract::extract;
pub use indexer::pipeline::{analyze_file, analyze_project, ProjectReport, SkippedFile};
pub use query::search::{search, search_with, QueryHit, SearchOptions};
pub use semantic::chunks::{file_chunks, EntityChunk};
pub use semantic::index::{FileArtifacts, IndexBuilder, SemanticIndex};
pub use semantic::scorer::{score, score_file};
pub use semantic::tagger::DomainTagger;
pub use semantic::workflows::detect_workflows;
