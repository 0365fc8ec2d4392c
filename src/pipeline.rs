//! Pipeline contracts: importer responses, committers, per-reference
//! errors, and the checksum short-circuit used by import stages.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crawler::context::ReferenceContext;
use crate::document::CrawlDoc;
use crate::events::{CrawlerEvent, EventKind, EventSubject};
use crate::reference::RefState;

/// Outcome reported by an importer pipeline stage chain.
#[derive(Debug, Clone)]
pub struct ImporterStatus {
    pub success: bool,
    pub description: String,
}

impl ImporterStatus {
    pub fn success(description: impl Into<String>) -> Self {
        Self {
            success: true,
            description: description.into(),
        }
    }

    pub fn failure(description: impl Into<String>) -> Self {
        Self {
            success: false,
            description: description.into(),
        }
    }
}

/// Result of running a reference through the importer pipeline. Nested
/// responses describe embedded documents discovered during import; the
/// driver processes them recursively on the same worker.
#[derive(Debug)]
pub struct ImporterResponse {
    pub reference: String,
    pub document: CrawlDoc,
    pub status: ImporterStatus,
    pub nested: Vec<ImporterResponse>,
}

impl ImporterResponse {
    pub fn is_success(&self) -> bool {
        self.status.success
    }
}

/// Classification of per-reference pipeline failures, matched against the
/// configured `stop_on_errors` list to decide whether a failure is fatal
/// to the whole crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineErrorKind {
    Fetch,
    Import,
    Commit,
    Io,
    Other,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("import failed: {0}")]
    Import(String),
    #[error("commit failed: {0}")]
    Commit(String),
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    pub fn kind(&self) -> PipelineErrorKind {
        match self {
            PipelineError::Fetch(_) => PipelineErrorKind::Fetch,
            PipelineError::Import(_) => PipelineErrorKind::Import,
            PipelineError::Commit(_) => PipelineErrorKind::Commit,
            PipelineError::Io(_) => PipelineErrorKind::Io,
            PipelineError::Other(_) => PipelineErrorKind::Other,
        }
    }
}

/// Downstream commit sink. Implementations must be thread-safe for
/// `add`/`remove`; `commit` is called exactly once after all workers
/// terminate. Delivery is at-least-once; sinks dedup by reference.
pub trait Committer: Send + Sync {
    fn add(&self, reference: &str, doc: &CrawlDoc) -> Result<(), PipelineError>;
    fn remove(&self, reference: &str, doc: Option<&CrawlDoc>) -> Result<(), PipelineError>;
    fn commit(&self) -> Result<(), PipelineError>;
}

/// Committer that appends add/delete operations to a JSONL file.
pub struct JsonlCommitter {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

#[derive(Serialize)]
struct CommitLine<'a> {
    op: &'a str,
    reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<usize>,
}

impl JsonlCommitter {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            writer: Mutex::new(None),
        }
    }

    fn write_line(&self, line: &CommitLine<'_>) -> Result<(), PipelineError> {
        let mut guard = self.writer.lock();
        if guard.is_none() {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            *guard = Some(BufWriter::new(file));
        }
        let writer = guard.as_mut().expect("writer initialized above");
        let json = serde_json::to_string(line).map_err(|e| PipelineError::Commit(e.to_string()))?;
        writeln!(writer, "{}", json)?;
        Ok(())
    }
}

impl Committer for JsonlCommitter {
    fn add(&self, reference: &str, doc: &CrawlDoc) -> Result<(), PipelineError> {
        self.write_line(&CommitLine {
            op: "add",
            reference,
            content_type: doc.content_type.as_deref(),
            size: Some(doc.content_len()),
        })
    }

    fn remove(&self, reference: &str, _doc: Option<&CrawlDoc>) -> Result<(), PipelineError> {
        self.write_line(&CommitLine {
            op: "delete",
            reference,
            content_type: None,
            size: None,
        })
    }

    fn commit(&self) -> Result<(), PipelineError> {
        if let Some(writer) = self.writer.lock().as_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

/// Compare a freshly computed metadata checksum against the cached one.
/// Returns `true` to continue the pipeline; `false` means the reference
/// is unmodified and the pipeline must terminate for it, with the state
/// already set by this stage.
pub fn resolve_meta_checksum(ctx: &mut ReferenceContext<'_>, new_checksum: Option<String>) -> bool {
    resolve_checksum(ctx, new_checksum, true)
}

/// Content-checksum variant of [`resolve_meta_checksum`]; same contract.
pub fn resolve_content_checksum(
    ctx: &mut ReferenceContext<'_>,
    new_checksum: Option<String>,
) -> bool {
    resolve_checksum(ctx, new_checksum, false)
}

fn resolve_checksum(
    ctx: &mut ReferenceContext<'_>,
    new_checksum: Option<String>,
    meta: bool,
) -> bool {
    let kind = if meta { "metadata" } else { "content" };

    if meta {
        ctx.reference.meta_checksum = new_checksum.clone();
    } else {
        ctx.reference.content_checksum = new_checksum.clone();
    }

    let Some(cached) = ctx.cached else {
        tracing::debug!(reference = %ctx.reference.reference, "accepted {kind} checksum (new)");
        return true;
    };
    let old_checksum = if meta {
        cached.meta_checksum.as_deref()
    } else {
        cached.content_checksum.as_deref()
    };

    let unchanged = match (new_checksum.as_deref(), old_checksum) {
        (Some(new), Some(old)) => !new.trim().is_empty() && new == old,
        _ => false,
    };

    if unchanged {
        tracing::debug!(reference = %ctx.reference.reference, "rejected {kind} checksum (unmodified)");
        ctx.reference.state = Some(RefState::Unmodified);
        ctx.crawl.events.fire(
            CrawlerEvent::for_reference(EventKind::RejectedUnmodified, ctx.reference)
                .with_subject(EventSubject::Status(format!("{kind} checksum unchanged"))),
        );
        return false;
    }

    tracing::debug!(reference = %ctx.reference.reference, "accepted {kind} checksum (modified)");
    true
}
