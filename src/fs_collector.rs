//! Filesystem collector: a small concrete handler where references are
//! local file paths. It gives the binary a usable `start` and shows the
//! intended shape of a collector built on the engine.

use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::checksum::{DocumentChecksummer, Sha256Checksummer};
use crate::config::FsCollectorConfig;
use crate::crawler::context::{CrawlContext, ReferenceContext, ReferenceHandler};
use crate::crawler::CrawlError;
use crate::events::{CrawlerEvent, EventKind, EventSubject};
use crate::pipeline::{
    resolve_content_checksum, resolve_meta_checksum, ImporterResponse, ImporterStatus,
    PipelineError,
};
use crate::reference::{CrawlRef, RefState};

pub struct FsReferenceHandler {
    checksummer: Box<dyn DocumentChecksummer>,
    /// Lowercased extensions accepted by the queue filter; empty = all.
    include_extensions: Vec<String>,
}

impl FsReferenceHandler {
    pub fn new(config: &FsCollectorConfig) -> Self {
        Self {
            checksummer: Box::new(Sha256Checksummer::new()),
            include_extensions: config
                .include_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    fn accepts(&self, reference: &str) -> bool {
        if self.include_extensions.is_empty() {
            return true;
        }
        Path::new(reference)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| self.include_extensions.contains(&e.to_ascii_lowercase()))
            .unwrap_or(false)
    }

    fn content_type_for(path: &Path) -> Option<String> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let content_type = match ext.as_str() {
            "txt" => "text/plain",
            "md" => "text/markdown",
            "html" | "htm" => "text/html",
            "xml" => "application/xml",
            "json" => "application/json",
            "csv" => "text/csv",
            "pdf" => "application/pdf",
            _ => "application/octet-stream",
        };
        Some(content_type.to_string())
    }
}

impl ReferenceHandler for FsReferenceHandler {
    fn execute_queue_pipeline(
        &self,
        ctx: &CrawlContext,
        reference: CrawlRef,
    ) -> Result<(), CrawlError> {
        if !self.accepts(&reference.reference) {
            ctx.events.fire(
                CrawlerEvent::for_reference(EventKind::RejectedFilter, &reference)
                    .with_subject(EventSubject::Status("extension not included".to_string())),
            );
            return Ok(());
        }
        ctx.store.queue(&reference)?;
        Ok(())
    }

    fn importer_pipeline(
        &self,
        ctx: &mut ReferenceContext<'_>,
    ) -> Result<Option<ImporterResponse>, PipelineError> {
        let path = Path::new(ctx.reference.reference.as_str()).to_path_buf();

        let metadata = match std::fs::metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ctx.reference.state = Some(RefState::NotFound);
                ctx.crawl.events.fire(
                    CrawlerEvent::for_reference(EventKind::RejectedNotFound, ctx.reference)
                        .with_subject(EventSubject::Status("file not found".to_string())),
                );
                return Ok(None);
            }
            Err(e) => return Err(PipelineError::Fetch(e.to_string())),
        };

        if !metadata.is_file() {
            ctx.reference.state = Some(RefState::BadStatus);
            ctx.crawl.events.fire(
                CrawlerEvent::for_reference(EventKind::RejectedBadStatus, ctx.reference)
                    .with_subject(EventSubject::Status("not a regular file".to_string())),
            );
            return Ok(None);
        }

        // Cheap change probe before reading the content: size + mtime.
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let fingerprint = format!("{}:{}", metadata.len(), mtime);
        if !resolve_meta_checksum(ctx, Some(fingerprint)) {
            return Ok(None);
        }

        let content = std::fs::read(&path).map_err(|e| PipelineError::Fetch(e.to_string()))?;
        ctx.document.set_content(content);
        ctx.document.content_type = Self::content_type_for(&path);

        let checksum = self.checksummer.checksum(ctx.document);
        if !resolve_content_checksum(ctx, checksum) {
            return Ok(None);
        }

        ctx.reference.state = Some(if ctx.cached.is_some() {
            RefState::Modified
        } else {
            RefState::New
        });
        ctx.reference.content_type = ctx.document.content_type.clone();
        ctx.reference.stamp_crawl_date();

        Ok(Some(ImporterResponse {
            reference: ctx.reference.reference.clone(),
            document: std::mem::take(ctx.document),
            status: ImporterStatus::success("imported from filesystem"),
            nested: Vec::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrawlerConfig;
    use crate::document::CrawlDoc;
    use crate::events::EventBus;
    use crate::pipeline::Committer;
    use crate::spoil::GenericSpoilPolicy;
    use crate::store::{CrawlStore, MemoryBackend};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct NullCommitter;

    impl Committer for NullCommitter {
        fn add(&self, _reference: &str, _doc: &CrawlDoc) -> Result<(), PipelineError> {
            Ok(())
        }
        fn remove(&self, _reference: &str, _doc: Option<&CrawlDoc>) -> Result<(), PipelineError> {
            Ok(())
        }
        fn commit(&self) -> Result<(), PipelineError> {
            Ok(())
        }
    }

    fn test_context() -> CrawlContext {
        CrawlContext {
            id: "fs-test".to_string(),
            config: CrawlerConfig {
                id: "fs-test".to_string(),
                ..CrawlerConfig::default()
            },
            store: Arc::new(CrawlStore::new(Box::new(MemoryBackend::new()))),
            events: Arc::new(EventBus::new()),
            committer: Arc::new(NullCommitter),
            spoil_policy: Arc::new(GenericSpoilPolicy::new()),
        }
    }

    fn import(
        handler: &FsReferenceHandler,
        crawl: &CrawlContext,
        reference: &mut CrawlRef,
        cached: Option<&CrawlRef>,
    ) -> Result<Option<ImporterResponse>, PipelineError> {
        let mut doc = CrawlDoc::new(reference.reference.clone());
        let mut ctx = ReferenceContext {
            crawl,
            reference,
            cached,
            document: &mut doc,
            delete: false,
            orphan: false,
        };
        handler.importer_pipeline(&mut ctx)
    }

    #[test]
    fn test_extension_filter() {
        let handler = FsReferenceHandler::new(&FsCollectorConfig {
            include_extensions: vec!["md".to_string(), ".TXT".to_string()],
        });
        assert!(handler.accepts("/docs/readme.md"));
        assert!(handler.accepts("/docs/notes.txt"));
        assert!(!handler.accepts("/docs/image.png"));
        assert!(!handler.accepts("/docs/no-extension"));

        let open = FsReferenceHandler::new(&FsCollectorConfig::default());
        assert!(open.accepts("/docs/anything.bin"));
    }

    #[test]
    fn test_import_new_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.md");
        std::fs::write(&file, "# hello").unwrap();

        let handler = FsReferenceHandler::new(&FsCollectorConfig::default());
        let crawl = test_context();
        let mut reference = CrawlRef::new(file.to_string_lossy().to_string());

        let response = import(&handler, &crawl, &mut reference, None)
            .unwrap()
            .unwrap();

        assert!(response.is_success());
        assert_eq!(reference.state, Some(RefState::New));
        assert!(reference.content_checksum.is_some());
        assert!(reference.meta_checksum.is_some());
        assert_eq!(reference.content_type.as_deref(), Some("text/markdown"));
        assert_eq!(response.document.content, b"# hello");
    }

    #[test]
    fn test_import_missing_file_maps_to_not_found() {
        let handler = FsReferenceHandler::new(&FsCollectorConfig::default());
        let crawl = test_context();
        let mut reference = CrawlRef::new("/nonexistent/definitely-missing.md");

        let response = import(&handler, &crawl, &mut reference, None).unwrap();
        assert!(response.is_none());
        assert_eq!(reference.state, Some(RefState::NotFound));
    }

    #[test]
    fn test_unmodified_file_short_circuits() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.md");
        std::fs::write(&file, "stable content").unwrap();

        let handler = FsReferenceHandler::new(&FsCollectorConfig::default());
        let crawl = test_context();

        // First crawl records the checksums.
        let mut first = CrawlRef::new(file.to_string_lossy().to_string());
        import(&handler, &crawl, &mut first, None).unwrap().unwrap();

        // Second crawl with the first run's result as cache.
        let mut second = CrawlRef::new(file.to_string_lossy().to_string());
        let response = import(&handler, &crawl, &mut second, Some(&first)).unwrap();

        assert!(response.is_none());
        assert_eq!(second.state, Some(RefState::Unmodified));
    }

    #[test]
    fn test_modified_file_is_reimported() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.md");
        std::fs::write(&file, "version one").unwrap();

        let handler = FsReferenceHandler::new(&FsCollectorConfig::default());
        let crawl = test_context();

        let mut first = CrawlRef::new(file.to_string_lossy().to_string());
        import(&handler, &crawl, &mut first, None).unwrap().unwrap();

        // Rewrite with different content (and different length, so the
        // meta fingerprint changes regardless of mtime resolution).
        std::fs::write(&file, "version two, longer").unwrap();

        let mut second = CrawlRef::new(file.to_string_lossy().to_string());
        let response = import(&handler, &crawl, &mut second, Some(&first)).unwrap();

        assert!(response.is_some());
        assert_eq!(second.state, Some(RefState::Modified));
        assert_ne!(second.content_checksum, first.content_checksum);
    }
}
