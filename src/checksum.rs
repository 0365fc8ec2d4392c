//! Document checksumming used for unmodified detection.
//!
//! The engine never inspects checksum values; it only consumes the
//! accept/short-circuit decision made in the pipeline (see
//! `pipeline::resolve_content_checksum`).

use sha2::{Digest, Sha256};

use crate::document::CrawlDoc;

/// Produces a stable checksum for a document, or `None` when there is
/// nothing to checksum (empty source field).
pub trait DocumentChecksummer: Send + Sync {
    fn checksum(&self, doc: &CrawlDoc) -> Option<String>;
}

/// SHA-256 checksummer over the document content, or over a single
/// metadata field when `source_field` is set.
#[derive(Debug, Default)]
pub struct Sha256Checksummer {
    /// Optional metadata field to checksum instead of the content.
    pub source_field: Option<String>,
}

impl Sha256Checksummer {
    pub fn new() -> Self {
        Self { source_field: None }
    }

    pub fn of_field(field: impl Into<String>) -> Self {
        Self {
            source_field: Some(field.into()),
        }
    }

    fn digest(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }
}

impl DocumentChecksummer for Sha256Checksummer {
    fn checksum(&self, doc: &CrawlDoc) -> Option<String> {
        if let Some(field) = &self.source_field {
            let value = doc.metadata.get(field)?;
            if value.trim().is_empty() {
                return None;
            }
            return Some(Self::digest(value.as_bytes()));
        }
        Some(Self::digest(&doc.content))
    }
}
