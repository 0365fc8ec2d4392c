//! Crawler lifecycle: init, run, stop, clean, store export/import.
//!
//! One `Crawler` owns a store, an event bus, a committer and a reference
//! handler, and drives the whole pass: main reference processing, orphan
//! handling, and the single final commit.

pub mod context;
mod driver;
mod worker;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::{CrawlerConfig, ConfigError, OrphanStrategy, StoreKind};
use crate::events::{CrawlerEvent, EventBus, EventKind, EventListener, EventSubject};
use crate::pipeline::{Committer, PipelineError};
use crate::progress::ProgressReporter;
use crate::reference::CrawlRef;
use crate::spoil::SpoilPolicy;
use crate::store::{transfer, CrawlStore, MemoryBackend, SledBackend, StoreError};

pub use context::{CrawlContext, ReferenceContext, ReferenceHandler};

/// How often the run watches for an external stop request.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Environment toggle gating the store-counter monitoring listener.
pub const MONITOR_ENV_VAR: &str = "CRAWLCORE_MONITOR";

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Cooperative stop flag shared by workers, the watcher thread and the
/// public `stop()` entry point. Requesting twice is the same as once.
pub(crate) struct StopSignal {
    flag: AtomicBool,
}

impl StopSignal {
    fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
        }
    }

    pub(crate) fn request(&self, events: &EventBus) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            events.fire(CrawlerEvent::lifecycle(EventKind::CrawlerStopBegin));
            tracing::info!("stopping the crawler");
        }
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Counters owned by one run. The processed count intentionally tracks
/// finalizations, not store reads, so progress stays cheap; a reader may
/// see it lag the store by at most one reference per worker.
pub(crate) struct RunCounters {
    pub processed: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub processed: u64,
    pub resumed: bool,
    pub stopped: bool,
    pub duration_secs: u64,
}

pub struct Crawler {
    context: CrawlContext,
    handler: Box<dyn ReferenceHandler>,
    stop: Arc<StopSignal>,
    counters: RunCounters,
    progress: ProgressReporter,
}

impl Crawler {
    pub fn new(
        config: CrawlerConfig,
        handler: Box<dyn ReferenceHandler>,
        committer: Arc<dyn Committer>,
        spoil_policy: Arc<dyn SpoilPolicy>,
    ) -> Result<Self, CrawlError> {
        config.validate()?;

        let store: CrawlStore = match config.store {
            StoreKind::Sled => {
                std::fs::create_dir_all(config.store_dir())?;
                CrawlStore::new(Box::new(SledBackend::open(config.store_dir())?))
            }
            StoreKind::Memory => CrawlStore::new(Box::new(MemoryBackend::new())),
        };

        let context = CrawlContext {
            id: config.id.clone(),
            config,
            store: Arc::new(store),
            events: Arc::new(EventBus::new()),
            committer,
            spoil_policy,
        };

        Ok(Self {
            context,
            handler,
            stop: Arc::new(StopSignal::new()),
            counters: RunCounters {
                processed: AtomicU64::new(0),
            },
            progress: ProgressReporter::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.context.id
    }

    pub fn events(&self) -> &EventBus {
        &self.context.events
    }

    pub fn store(&self) -> &CrawlStore {
        &self.context.store
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    /// Request a graceful stop: in-flight references finish, nothing new
    /// is dequeued, and the run ends through the normal path.
    pub fn stop(&self) {
        self.stop.request(&self.context.events);
    }

    /// Open the store and reconcile prior state. Returns whether the run
    /// resumes unfinished work.
    fn init(&self) -> Result<bool, CrawlError> {
        let events = &self.context.events;
        events.fire(CrawlerEvent::lifecycle(EventKind::CrawlerInitBegin));

        std::fs::create_dir_all(self.context.config.downloads_dir())?;
        // A stale stop request from a previous run must not kill this one.
        let _ = std::fs::remove_file(self.context.config.stop_file());

        let resuming = self.context.store.open(true)?;
        self.counters
            .processed
            .store(self.context.store.processed_count()? as u64, Ordering::SeqCst);

        if resuming {
            tracing::info!(
                "resuming prior run: {} queued, {} already processed",
                self.context.store.queued_count()?,
                self.counters.processed.load(Ordering::SeqCst)
            );
        }

        events.fire(CrawlerEvent::lifecycle(EventKind::CrawlerInitEnd));
        Ok(resuming)
    }

    /// Run the crawl to completion (or until stopped). The store is left
    /// in a resumable state no matter how the run ends.
    pub fn run(&self) -> Result<RunSummary, CrawlError> {
        let resumed = self.init()?;
        let started = Instant::now();

        if monitoring_enabled() {
            self.context.events.register(Arc::new(StoreMonitor {
                store: self.context.store.clone(),
            }));
        }
        let (watcher, watcher_done) = self.spawn_stop_watcher();

        self.context
            .events
            .fire(CrawlerEvent::lifecycle(EventKind::CrawlerRunBegin));

        let outcome = self.execute(resumed);

        if self.stop.is_stopped() {
            self.context
                .events
                .fire(CrawlerEvent::lifecycle(EventKind::CrawlerStopEnd));
        }
        let run_end = match &outcome {
            Ok(()) => CrawlerEvent::lifecycle(EventKind::CrawlerRunEnd),
            Err(e) => CrawlerEvent::lifecycle(EventKind::CrawlerRunEnd)
                .with_subject(EventSubject::Error(e.to_string())),
        };
        self.context.events.fire(run_end);

        if let Err(e) = self.handler.cleanup_execution(&self.context) {
            tracing::error!("cleanup failed: {e}");
        }

        watcher_done.store(true, Ordering::SeqCst);
        let _ = watcher.join();

        match self.context.store.close() {
            Ok(()) => {}
            Err(e) if outcome.is_ok() => return Err(e.into()),
            Err(e) => tracing::error!("could not close store cleanly: {e}"),
        }

        tracing::info!(
            "crawler {} in {}s",
            if self.stop.is_stopped() {
                "stopped"
            } else {
                "completed"
            },
            started.elapsed().as_secs()
        );

        outcome.map(|()| RunSummary {
            processed: self.counters.processed.load(Ordering::SeqCst),
            resumed,
            stopped: self.stop.is_stopped(),
            duration_secs: started.elapsed().as_secs(),
        })
    }

    fn execute(&self, resuming: bool) -> Result<(), CrawlError> {
        self.handler.prepare_execution(&self.context, resuming)?;

        if !resuming {
            for seed in &self.context.config.seeds {
                self.handler
                    .execute_queue_pipeline(&self.context, CrawlRef::new(seed.clone()))?;
            }
        }

        tracing::info!("crawling references...");
        let mut run_error = worker::process_references(
            &self.context,
            self.handler.as_ref(),
            &self.counters,
            &self.progress,
            &self.stop,
            false,
            false,
        );

        if !self.stop.is_stopped() {
            if let Err(e) = self.handle_orphans() {
                run_error.get_or_insert(e);
            }
        }

        // The committer gets its single commit even when the crawl was
        // stopped or a worker failed; whatever made it through the
        // pipeline is delivered.
        tracing::info!(
            "crawler {}: committing documents",
            if self.stop.is_stopped() {
                "stopping"
            } else {
                "finishing"
            }
        );
        if let Err(e) = self.context.committer.commit() {
            if run_error.is_none() {
                run_error = Some(e.into());
            } else {
                tracing::error!("commit failed after run error: {e}");
            }
        }

        tracing::info!(
            "{} reference(s) processed.",
            self.counters.processed.load(Ordering::SeqCst)
        );

        match run_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Second-phase treatment of cache entries never re-encountered in
    /// the main pass.
    fn handle_orphans(&self) -> Result<(), CrawlError> {
        match self.context.config.orphan_strategy {
            OrphanStrategy::Ignore => {
                tracing::info!(
                    "ignoring {} cached orphan reference(s)",
                    self.context.store.cached_count()?
                );
                Ok(())
            }
            OrphanStrategy::Process => self.reprocess_cache_orphans(),
            OrphanStrategy::Delete => self.delete_cache_orphans(),
        }
    }

    fn reprocess_cache_orphans(&self) -> Result<(), CrawlError> {
        let max_documents = self.context.config.max_documents;
        if max_documents > 0 && self.counters.processed.load(Ordering::SeqCst) >= max_documents {
            tracing::info!("maximum documents reached; not reprocessing orphans (if any)");
            return Ok(());
        }

        tracing::info!("reprocessing any cached/orphan references...");
        let mut count = 0u64;
        for record in self.context.store.cached_records()? {
            self.handler.execute_queue_pipeline(&self.context, record)?;
            count += 1;
        }
        if count > 0 {
            if let Some(e) = worker::process_references(
                &self.context,
                self.handler.as_ref(),
                &self.counters,
                &self.progress,
                &self.stop,
                false,
                true,
            ) {
                return Err(e);
            }
        }
        tracing::info!("reprocessed {count} cached/orphan references");
        Ok(())
    }

    fn delete_cache_orphans(&self) -> Result<(), CrawlError> {
        tracing::info!("deleting orphan references (if any)...");
        let mut count = 0u64;
        for record in self.context.store.cached_records()? {
            self.context.store.queue(&record)?;
            count += 1;
        }
        if count > 0 {
            if let Some(e) = worker::process_references(
                &self.context,
                self.handler.as_ref(),
                &self.counters,
                &self.progress,
                &self.stop,
                true,
                false,
            ) {
                return Err(e);
            }
        }
        tracing::info!("deleted {count} orphan references");
        Ok(())
    }

    /// Watch for the stop marker file the `stop` subcommand drops, so a
    /// separate process can request a graceful stop.
    fn spawn_stop_watcher(&self) -> (std::thread::JoinHandle<()>, Arc<AtomicBool>) {
        let done = Arc::new(AtomicBool::new(false));
        let done_flag = done.clone();
        let stop = self.stop.clone();
        let events = self.context.events.clone();
        let stop_file = self.context.config.stop_file();

        let handle = std::thread::spawn(move || {
            while !done_flag.load(Ordering::SeqCst) {
                if stop_file.exists() {
                    let _ = std::fs::remove_file(&stop_file);
                    stop.request(&events);
                }
                std::thread::sleep(STOP_POLL_INTERVAL);
            }
        });
        (handle, done)
    }

    /// Destroy everything this crawler persisted. Consumes the crawler so
    /// the store is closed before its files are removed.
    pub fn clean(self) -> Result<(), CrawlError> {
        let events = self.context.events.clone();
        let dir = self.context.config.crawler_dir();

        events.fire(CrawlerEvent::lifecycle(EventKind::CrawlerCleanBegin));
        let _ = self.context.store.close();
        drop(self);

        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        events.fire(CrawlerEvent::lifecycle(EventKind::CrawlerCleanEnd));
        tracing::info!("crawler work directory removed: {}", dir.display());
        Ok(())
    }

    /// Export every store partition to a JSONL file under `dir`.
    pub fn export_store(&self, dir: &Path) -> Result<PathBuf, CrawlError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!(
            "{}-store.jsonl",
            crate::config::safe_file_name(&self.context.id)
        ));
        transfer::export_store(&self.context.store, &path)?;
        Ok(path)
    }

    /// Import a previously exported store file.
    pub fn import_store(&self, file: &Path) -> Result<usize, CrawlError> {
        Ok(transfer::import_store(&self.context.store, file)?)
    }
}

fn monitoring_enabled() -> bool {
    std::env::var(MONITOR_ENV_VAR)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Logs store partition counters at run boundaries when monitoring is
/// enabled.
struct StoreMonitor {
    store: Arc<CrawlStore>,
}

impl EventListener for StoreMonitor {
    fn on_event(&self, event: &CrawlerEvent) {
        if !matches!(
            event.kind,
            EventKind::CrawlerRunBegin | EventKind::CrawlerRunEnd | EventKind::CrawlerStopEnd
        ) {
            return;
        }
        tracing::info!(
            queued = self.store.queued_count().unwrap_or(0),
            active = self.store.active_count().unwrap_or(0),
            processed = self.store.processed_count().unwrap_or(0),
            cached = self.store.cached_count().unwrap_or(0),
            "store counters at {}",
            event.kind
        );
    }
}
