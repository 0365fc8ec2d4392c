//! Worker pool pulling references from the store until the queue drains
//! or the crawl is stopped.

use std::sync::atomic::Ordering;
use std::time::Duration;

use parking_lot::Mutex;

use crate::crawler::context::{CrawlContext, ReferenceHandler};
use crate::crawler::driver::Driver;
use crate::crawler::{CrawlError, RunCounters, StopSignal};
use crate::progress::ProgressReporter;

/// Idle quantum while peers may still produce new queue entries.
const MINIMUM_DELAY: Duration = Duration::from_millis(1);

/// Spawn the worker pool and block until every worker has exited. The
/// thread scope doubles as the termination barrier. Returns the first
/// error that stopped the crawl, if any.
pub(crate) fn process_references(
    crawl: &CrawlContext,
    handler: &dyn ReferenceHandler,
    counters: &RunCounters,
    progress: &ProgressReporter,
    stop: &StopSignal,
    delete: bool,
    orphan: bool,
) -> Option<CrawlError> {
    let num_threads = crawl.config.num_threads;
    let first_error: Mutex<Option<CrawlError>> = Mutex::new(None);

    std::thread::scope(|scope| {
        for index in 0..num_threads {
            let worker = index + 1;
            let first_error = &first_error;
            scope.spawn(move || {
                tracing::debug!("crawler worker #{worker} started");
                while !stop.is_stopped() {
                    match process_one(crawl, handler, counters, progress, delete, orphan) {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => {
                            // Anything escaping the per-reference handling
                            // puts the whole crawl at risk.
                            tracing::error!(
                                "an error occurred that could compromise the stability \
                                 of the crawler; stopping to avoid further issues: {e}"
                            );
                            stop.request(&crawl.events);
                            let mut slot = first_error.lock();
                            if slot.is_none() {
                                *slot = Some(e);
                            }
                            break;
                        }
                    }
                }
                tracing::debug!("crawler worker #{worker} finished");
            });
        }
    });

    first_error.into_inner()
}

/// Process at most one reference. `Ok(true)` means there may be more
/// work; `Ok(false)` means this worker can exit.
fn process_one(
    crawl: &CrawlContext,
    handler: &dyn ReferenceHandler,
    counters: &RunCounters,
    progress: &ProgressReporter,
    delete: bool,
    orphan: bool,
) -> Result<bool, CrawlError> {
    let max_documents = crawl.config.max_documents;
    if !delete && max_documents > 0 && counters.processed.load(Ordering::SeqCst) >= max_documents {
        tracing::info!("maximum documents reached: {max_documents}");
        return Ok(false);
    }

    match crawl.store.next_queued()? {
        Some(reference) => {
            tracing::trace!(reference = %reference.reference, "dequeued reference");
            let driver = Driver {
                crawl,
                handler,
                counters,
            };
            driver.process(reference, delete, orphan)?;
            progress.update(
                counters.processed.load(Ordering::SeqCst),
                crawl.store.queued_count()? as u64,
            );
            Ok(true)
        }
        None => {
            // A peer still holding a reference may extract links into the
            // queue, so only exit once the whole pass is drained.
            if crawl.store.active_count()? == 0 && crawl.store.is_queue_empty()? {
                return Ok(false);
            }
            std::thread::sleep(MINIMUM_DELAY);
            Ok(true)
        }
    }
}
