//! Context objects threaded through every pipeline call, and the
//! capability interface a concrete collector implements to specialize
//! the engine.

use std::sync::Arc;

use crate::config::CrawlerConfig;
use crate::crawler::CrawlError;
use crate::document::CrawlDoc;
use crate::events::{CrawlerEvent, EventBus, EventKind, EventSubject};
use crate::pipeline::{Committer, ImporterResponse, PipelineError};
use crate::reference::CrawlRef;
use crate::spoil::SpoilPolicy;
use crate::store::CrawlStore;

/// Shared state of one crawl, passed explicitly wherever it is needed.
pub struct CrawlContext {
    pub id: String,
    pub config: CrawlerConfig,
    pub store: Arc<CrawlStore>,
    pub events: Arc<EventBus>,
    pub committer: Arc<dyn Committer>,
    pub spoil_policy: Arc<dyn SpoilPolicy>,
}

/// Per-reference scratch owned by the worker currently processing it.
pub struct ReferenceContext<'a> {
    pub crawl: &'a CrawlContext,
    pub reference: &'a mut CrawlRef,
    /// Entry from the previous run's cache, if the reference was crawled
    /// before.
    pub cached: Option<&'a CrawlRef>,
    pub document: &'a mut CrawlDoc,
    /// Set during an orphan delete sweep: skip fetching, issue removal.
    pub delete: bool,
    /// Set when the reference is being reprocessed as a cache orphan.
    pub orphan: bool,
}

/// Capability interface concrete collectors implement. Every method has a
/// sensible default except the importer pipeline, so a minimal collector
/// only decides how a reference turns into a document.
pub trait ReferenceHandler: Send + Sync {
    /// Called once before the main pass, typically to queue seeds. On a
    /// resumed run the queue already holds the prior run's work.
    fn prepare_execution(&self, _ctx: &CrawlContext, _resuming: bool) -> Result<(), CrawlError> {
        Ok(())
    }

    /// Called once after the run, before the store closes.
    fn cleanup_execution(&self, _ctx: &CrawlContext) -> Result<(), CrawlError> {
        Ok(())
    }

    /// Route a reference into the queue. Override to apply reference
    /// filters or dedup; the default queues unconditionally.
    fn execute_queue_pipeline(
        &self,
        ctx: &CrawlContext,
        reference: CrawlRef,
    ) -> Result<(), CrawlError> {
        ctx.store.queue(&reference)?;
        Ok(())
    }

    /// Wrap a fresh or imported document before it enters the next stage.
    fn wrap_document(&self, _reference: &CrawlRef, doc: CrawlDoc) -> CrawlDoc {
        doc
    }

    /// Last chance to adjust a reference before the pipeline runs.
    fn init_reference(
        &self,
        _reference: &mut CrawlRef,
        _cached: Option<&CrawlRef>,
        _doc: &mut CrawlDoc,
    ) {
    }

    /// Fetch and import one reference. Returning `Ok(None)` means the
    /// pipeline short-circuited (filter, unmodified checksum, not found)
    /// with the reference state already set accordingly.
    fn importer_pipeline(
        &self,
        ctx: &mut ReferenceContext<'_>,
    ) -> Result<Option<ImporterResponse>, PipelineError>;

    /// Push an imported document to the committer. The default adds the
    /// document and fires DOCUMENT_COMMITTED_ADD.
    fn committer_pipeline(
        &self,
        ctx: &CrawlContext,
        doc: &mut CrawlDoc,
        reference: &mut CrawlRef,
        _cached: Option<&CrawlRef>,
    ) -> Result<(), PipelineError> {
        ctx.committer.add(&reference.reference, doc)?;
        ctx.events.fire(
            CrawlerEvent::for_reference(EventKind::DocumentCommittedAdd, reference).with_subject(
                EventSubject::Document {
                    content_type: doc.content_type.clone(),
                    size: doc.content_len(),
                },
            ),
        );
        Ok(())
    }

    /// Build the reference for an embedded child document.
    fn create_embedded_reference(&self, reference: &str, parent: &CrawlRef) -> CrawlRef {
        CrawlRef::embedded(reference, parent)
    }

    /// Mark alternate identities of a reference (e.g. canonical aliases)
    /// as processed. Default: none exist.
    fn mark_reference_variations_as_processed(&self, _ctx: &CrawlContext, _reference: &CrawlRef) {}

    /// Called at the start of finalize, before cache back-fill.
    fn before_finalize(
        &self,
        _reference: &mut CrawlRef,
        _doc: Option<&mut CrawlDoc>,
        _cached: Option<&CrawlRef>,
    ) {
    }
}
