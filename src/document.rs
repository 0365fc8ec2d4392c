use std::collections::HashMap;

/// Metadata key flagging whether the reference was seen for the first
/// time this run (no cached entry from the previous run).
pub const META_IS_NEW_CRAWL: &str = "crawl.is-new";

/// In-flight document wrapper handed through the importer and committer
/// pipelines. Owned exclusively by the worker processing the reference.
#[derive(Debug, Clone, Default)]
pub struct CrawlDoc {
    pub reference: String,
    pub metadata: HashMap<String, String>,
    pub content: Vec<u8>,
    pub content_type: Option<String>,
}

impl CrawlDoc {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            metadata: HashMap::new(),
            content: Vec::new(),
            content_type: None,
        }
    }

    pub fn set_content(&mut self, content: Vec<u8>) {
        self.content = content;
    }

    pub fn content_len(&self) -> usize {
        self.content.len()
    }

    /// Release the content buffer. Metadata survives so committers that
    /// only need it (e.g. deletions) can still read it after finalize.
    pub fn dispose(&mut self) {
        self.content = Vec::new();
    }
}
