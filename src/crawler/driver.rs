//! Per-reference pipeline driver: runs one dequeued reference through
//! import and commit, finalizes it into the store, and recursively
//! handles embedded documents on the same worker.

use std::sync::atomic::Ordering;

use crate::crawler::context::{CrawlContext, ReferenceContext, ReferenceHandler};
use crate::crawler::{CrawlError, RunCounters};
use crate::document::{CrawlDoc, META_IS_NEW_CRAWL};
use crate::events::{CrawlerEvent, EventKind, EventSubject};
use crate::pipeline::{ImporterResponse, PipelineError};
use crate::reference::{CrawlRef, RefState};
use crate::spoil::{SpoilAction, DEFAULT_SPOIL_ACTION};

pub(crate) struct Driver<'a> {
    pub crawl: &'a CrawlContext,
    pub handler: &'a dyn ReferenceHandler,
    pub counters: &'a RunCounters,
}

impl Driver<'_> {
    /// Process one dequeued reference to its terminal state. Returns an
    /// error only when the crawl itself must stop (store failure, or a
    /// pipeline error whose kind is configured fatal).
    pub fn process(
        &self,
        mut reference: CrawlRef,
        delete: bool,
        orphan: bool,
    ) -> Result<(), CrawlError> {
        let mut doc = self
            .handler
            .wrap_document(&reference, CrawlDoc::new(reference.reference.clone()));

        let cached = self.crawl.store.get_cached(&reference.reference)?;
        doc.metadata
            .insert(META_IS_NEW_CRAWL.to_string(), cached.is_none().to_string());

        self.handler
            .init_reference(&mut reference, cached.as_ref(), &mut doc);

        if delete {
            // Orphan expulsion sweep: no fetch, straight to removal.
            return match self.delete_reference(&mut reference, Some(&doc)) {
                Ok(()) => {
                    self.finalize(&mut reference, Some(&mut doc), cached.as_ref());
                    Ok(())
                }
                Err(e) => self.apply_error(e, &mut reference, Some(&mut doc), cached.as_ref()),
            };
        }

        tracing::debug!(reference = %reference.reference, "processing reference");

        let imported = {
            let mut ctx = ReferenceContext {
                crawl: self.crawl,
                reference: &mut reference,
                cached: cached.as_ref(),
                document: &mut doc,
                delete,
                orphan,
            };
            self.handler.importer_pipeline(&mut ctx)
        };

        match imported {
            Ok(Some(response)) => {
                self.process_import_response(response, &mut reference, cached.as_ref())
            }
            Ok(None) => {
                if reference
                    .state
                    .map(|s| s.is_new_or_modified())
                    .unwrap_or(false)
                {
                    reference.state = Some(RefState::Rejected);
                }
                // The importer never engaged for this reference, so no
                // REJECTED_IMPORT here: whatever stage aborted the
                // pipeline has already fired its own rejection event.
                // Worth revisiting if a stage can abort silently.
                self.finalize(&mut reference, Some(&mut doc), cached.as_ref());
                Ok(())
            }
            Err(e) => self.apply_error(e, &mut reference, Some(&mut doc), cached.as_ref()),
        }
    }

    /// Route an importer response: committed on success, rejected on
    /// failure; then finalize and recurse into embedded documents.
    fn process_import_response(
        &self,
        response: ImporterResponse,
        reference: &mut CrawlRef,
        cached: Option<&CrawlRef>,
    ) -> Result<(), CrawlError> {
        let ImporterResponse {
            document,
            status,
            nested,
            ..
        } = response;
        let mut doc = document;

        if status.success {
            self.crawl.events.fire(
                CrawlerEvent::for_reference(EventKind::DocumentImported, reference)
                    .with_subject(EventSubject::Status(status.description.clone())),
            );
            let mut wrapped = self.handler.wrap_document(reference, doc);
            match self
                .handler
                .committer_pipeline(self.crawl, &mut wrapped, reference, cached)
            {
                Ok(()) => self.finalize(reference, Some(&mut wrapped), cached),
                Err(e) => self.apply_error(e, reference, Some(&mut wrapped), cached)?,
            }
        } else {
            reference.state = Some(RefState::Rejected);
            self.crawl.events.fire(
                CrawlerEvent::for_reference(EventKind::RejectedImport, reference)
                    .with_subject(EventSubject::Status(status.description.clone())),
            );
            tracing::debug!(
                reference = %reference.reference,
                "import unsuccessful: {}",
                status.description
            );
            self.finalize(reference, Some(&mut doc), cached);
        }

        // Embedded documents ride on the parent's worker, after the
        // parent is finalized.
        for child in nested {
            let mut embedded = self
                .handler
                .create_embedded_reference(&child.reference, reference);
            let embedded_cached = self.crawl.store.get_cached(&child.reference)?;
            self.process_import_response(child, &mut embedded, embedded_cached.as_ref())?;
        }
        Ok(())
    }

    /// ERROR terminal handling for a single reference. Propagates the
    /// error only when its kind is in the configured stop list.
    fn apply_error(
        &self,
        error: PipelineError,
        reference: &mut CrawlRef,
        doc: Option<&mut CrawlDoc>,
        cached: Option<&CrawlRef>,
    ) -> Result<(), CrawlError> {
        reference.state = Some(RefState::Error);
        self.crawl.events.fire(
            CrawlerEvent::for_reference(EventKind::RejectedError, reference)
                .with_subject(EventSubject::Error(error.to_string())),
        );
        tracing::info!(
            reference = %reference.reference,
            "could not process reference: {}",
            error
        );
        self.finalize(reference, doc, cached);

        if self.crawl.config.stop_on_errors.contains(&error.kind()) {
            return Err(CrawlError::Pipeline(error));
        }
        Ok(())
    }

    /// Terminal step for every reference, good or spoiled.
    pub fn finalize(
        &self,
        reference: &mut CrawlRef,
        mut doc: Option<&mut CrawlDoc>,
        cached: Option<&CrawlRef>,
    ) {
        if reference.state.is_none() {
            tracing::warn!(
                reference = %reference.reference,
                "reference state is unknown; assuming bad status"
            );
            reference.state = Some(RefState::BadStatus);
        }

        self.handler
            .before_finalize(reference, doc.as_deref_mut(), cached);

        let state = reference.state.expect("state ensured above");

        // A reference that skipped the full crawl cycle keeps whatever
        // the previous run knew about it.
        if !state.is_new_or_modified() {
            if let Some(cached) = cached {
                reference.copy_missing_from(cached);
            }
        }

        if !state.is_good() && state != RefState::Deleted {
            self.handle_spoiled(reference, doc.as_deref(), cached, state);
        }

        if let Err(e) = self.crawl.store.processed(reference) {
            tracing::error!(
                reference = %reference.reference,
                "could not mark reference as processed: {}",
                e
            );
        }
        self.counters.processed.fetch_add(1, Ordering::SeqCst);
        self.handler
            .mark_reference_variations_as_processed(self.crawl, reference);

        if let Some(doc) = doc {
            doc.dispose();
        }
    }

    fn handle_spoiled(
        &self,
        reference: &mut CrawlRef,
        doc: Option<&CrawlDoc>,
        cached: Option<&CrawlRef>,
        state: RefState,
    ) {
        let action = self
            .crawl
            .spoil_policy
            .resolve(&reference.reference, state)
            .unwrap_or(DEFAULT_SPOIL_ACTION);

        let delete_now = match action {
            SpoilAction::Ignore => {
                tracing::debug!(reference = %reference.reference, "ignoring spoiled reference");
                false
            }
            SpoilAction::Delete => {
                // Only worth a removal if something was committed before
                // and is not already gone.
                matches!(cached, Some(c) if c.state != Some(RefState::Deleted))
            }
            SpoilAction::GraceOnce => match cached {
                // No cache entry: likely dropped as invalid last run, so
                // a (possibly redundant) removal is the safe move.
                None => true,
                Some(c) if c.state == Some(RefState::Deleted) => false,
                Some(c) if c.state.map(|s| s.is_good()).unwrap_or(false) => {
                    tracing::debug!(
                        reference = %reference.reference,
                        "spoiled reference graced once; deleted next run if still spoiled"
                    );
                    false
                }
                Some(_) => true,
            },
        };

        if delete_now {
            if let Err(e) = self.delete_reference(reference, doc) {
                tracing::error!(
                    reference = %reference.reference,
                    "could not delete spoiled reference: {}",
                    e
                );
            }
        }
    }

    /// Mark the reference deleted and ask the committer to remove it.
    fn delete_reference(
        &self,
        reference: &mut CrawlRef,
        doc: Option<&CrawlDoc>,
    ) -> Result<(), PipelineError> {
        tracing::debug!(reference = %reference.reference, "deleting reference");
        reference.state = Some(RefState::Deleted);
        self.crawl.committer.remove(&reference.reference, doc)?;
        self.crawl.events.fire(
            CrawlerEvent::for_reference(EventKind::DocumentCommittedRemove, reference)
                .with_subject(EventSubject::None),
        );
        Ok(())
    }
}
