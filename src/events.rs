//! Typed crawler event stream.
//!
//! Listeners are synchronous and fired in registration order. A panicking
//! listener is logged and skipped; it never aborts the crawl.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::reference::CrawlRef;

/// Fixed event vocabulary fired by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    CrawlerInitBegin,
    CrawlerInitEnd,
    CrawlerRunBegin,
    CrawlerRunEnd,
    CrawlerStopBegin,
    CrawlerStopEnd,
    CrawlerCleanBegin,
    CrawlerCleanEnd,
    DocumentImported,
    DocumentCommittedAdd,
    DocumentCommittedRemove,
    RejectedFilter,
    RejectedUnmodified,
    RejectedNotFound,
    RejectedBadStatus,
    RejectedImport,
    RejectedError,
}

impl EventKind {
    pub fn name(self) -> &'static str {
        match self {
            EventKind::CrawlerInitBegin => "CRAWLER_INIT_BEGIN",
            EventKind::CrawlerInitEnd => "CRAWLER_INIT_END",
            EventKind::CrawlerRunBegin => "CRAWLER_RUN_BEGIN",
            EventKind::CrawlerRunEnd => "CRAWLER_RUN_END",
            EventKind::CrawlerStopBegin => "CRAWLER_STOP_BEGIN",
            EventKind::CrawlerStopEnd => "CRAWLER_STOP_END",
            EventKind::CrawlerCleanBegin => "CRAWLER_CLEAN_BEGIN",
            EventKind::CrawlerCleanEnd => "CRAWLER_CLEAN_END",
            EventKind::DocumentImported => "DOCUMENT_IMPORTED",
            EventKind::DocumentCommittedAdd => "DOCUMENT_COMMITTED_ADD",
            EventKind::DocumentCommittedRemove => "DOCUMENT_COMMITTED_REMOVE",
            EventKind::RejectedFilter => "REJECTED_FILTER",
            EventKind::RejectedUnmodified => "REJECTED_UNMODIFIED",
            EventKind::RejectedNotFound => "REJECTED_NOTFOUND",
            EventKind::RejectedBadStatus => "REJECTED_BAD_STATUS",
            EventKind::RejectedImport => "REJECTED_IMPORT",
            EventKind::RejectedError => "REJECTED_ERROR",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload attached to an event, one variant per real payload type so
/// listeners can dispatch without downcasting.
#[derive(Debug, Clone)]
pub enum EventSubject {
    None,
    /// Importer status description.
    Status(String),
    /// Rendered error that caused a rejection or an aborted run.
    Error(String),
    /// Summary of the document the event is about.
    Document {
        content_type: Option<String>,
        size: usize,
    },
}

#[derive(Debug, Clone)]
pub struct CrawlerEvent {
    pub kind: EventKind,
    /// Reference the event is about; lifecycle events carry none.
    pub reference: Option<CrawlRef>,
    pub subject: EventSubject,
}

impl CrawlerEvent {
    pub fn lifecycle(kind: EventKind) -> Self {
        Self {
            kind,
            reference: None,
            subject: EventSubject::None,
        }
    }

    pub fn for_reference(kind: EventKind, reference: &CrawlRef) -> Self {
        Self {
            kind,
            reference: Some(reference.clone()),
            subject: EventSubject::None,
        }
    }

    pub fn with_subject(mut self, subject: EventSubject) -> Self {
        self.subject = subject;
        self
    }
}

pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &CrawlerEvent);
}

/// Ordered, synchronous listener registry shared across workers.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn EventListener>) {
        self.listeners.write().push(listener);
    }

    pub fn fire(&self, event: CrawlerEvent) {
        let listeners = self.listeners.read();
        for listener in listeners.iter() {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener.on_event(&event)));
            if outcome.is_err() {
                tracing::error!(event = %event.kind, "event listener panicked; continuing");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recorder {
        tag: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl EventListener for Recorder {
        fn on_event(&self, event: &CrawlerEvent) {
            self.seen.lock().push(format!("{}:{}", self.tag, event.kind));
        }
    }

    struct Panicker;

    impl EventListener for Panicker {
        fn on_event(&self, _event: &CrawlerEvent) {
            panic!("listener fault");
        }
    }

    #[test]
    fn test_listeners_fire_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.register(Arc::new(Recorder { tag: "first", seen: seen.clone() }));
        bus.register(Arc::new(Recorder { tag: "second", seen: seen.clone() }));

        bus.fire(CrawlerEvent::lifecycle(EventKind::CrawlerRunBegin));

        let seen = seen.lock();
        assert_eq!(
            *seen,
            vec![
                "first:CRAWLER_RUN_BEGIN".to_string(),
                "second:CRAWLER_RUN_BEGIN".to_string()
            ]
        );
    }

    #[test]
    fn test_panicking_listener_does_not_stop_the_rest() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.register(Arc::new(Panicker));
        bus.register(Arc::new(Recorder { tag: "after", seen: seen.clone() }));

        bus.fire(CrawlerEvent::lifecycle(EventKind::CrawlerRunEnd));

        assert_eq!(seen.lock().len(), 1);
    }
}
