//! Crawl engine core of a resumable document collector framework.
//!
//! The engine coordinates a persistent queued/active/processed/cached
//! reference store, a pull-based worker pool, a per-reference
//! fetch→import→commit pipeline, spoiled-reference and orphan policies,
//! and a typed event stream. Concrete collectors specialize it by
//! implementing [`crawler::ReferenceHandler`]; the engine itself never
//! touches a network or parses a document.

pub mod checksum;
pub mod config;
pub mod crawler;
pub mod document;
pub mod events;
pub mod fs_collector;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod reference;
pub mod spoil;
pub mod store;

// Re-export the types a collector implementation touches most.
pub use crawler::{CrawlContext, CrawlError, Crawler, ReferenceContext, ReferenceHandler, RunSummary};
pub use document::CrawlDoc;
pub use events::{CrawlerEvent, EventBus, EventKind, EventListener, EventSubject};
pub use pipeline::{Committer, ImporterResponse, ImporterStatus, PipelineError};
pub use reference::{CrawlRef, RefState};
pub use spoil::{SpoilAction, SpoilPolicy};
pub use store::CrawlStore;
