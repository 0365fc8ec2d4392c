use serde::{Deserialize, Serialize};

/// Terminal and in-flight states a crawled reference can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefState {
    New,
    Modified,
    Unmodified,
    Rejected,
    Deleted,
    Error,
    BadStatus,
    NotFound,
}

impl RefState {
    /// New or modified references go through the full crawl life cycle.
    pub fn is_new_or_modified(self) -> bool {
        matches!(self, RefState::New | RefState::Modified)
    }

    /// Good states reflect a reference that resolved normally this run.
    /// Deleted is terminal but handled separately (removal, not failure).
    pub fn is_good(self) -> bool {
        matches!(self, RefState::New | RefState::Modified | RefState::Unmodified)
    }

    /// States produced by a failed fetch or processing attempt.
    pub fn is_bad(self) -> bool {
        matches!(self, RefState::Error | RefState::BadStatus | RefState::NotFound)
    }

    pub fn name(self) -> &'static str {
        match self {
            RefState::New => "NEW",
            RefState::Modified => "MODIFIED",
            RefState::Unmodified => "UNMODIFIED",
            RefState::Rejected => "REJECTED",
            RefState::Deleted => "DELETED",
            RefState::Error => "ERROR",
            RefState::BadStatus => "BAD_STATUS",
            RefState::NotFound => "NOT_FOUND",
        }
    }
}

impl std::fmt::Display for RefState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The unit of work: a crawlable resource identity plus the state
/// accumulated about it. Only the worker holding a reference mutates it;
/// once finalized it is stored immutably.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlRef {
    /// Stable string identity; primary key across all store partitions.
    pub reference: String,

    /// Top-level reference this one was discovered from, if any.
    pub parent_root_reference: Option<String>,

    /// True for references that entered the crawl as roots (seeds).
    pub root_parent: bool,

    pub state: Option<RefState>,

    pub meta_checksum: Option<String>,
    pub content_checksum: Option<String>,

    /// Set by the pipeline on a full crawl; back-filled from cache when a
    /// good-state crawl skipped the stages that would have produced it.
    pub content_type: Option<String>,

    /// Unix timestamp (seconds) of the crawl that produced this entry.
    pub crawl_date: Option<u64>,
}

impl CrawlRef {
    /// New root reference in the NEW state.
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            parent_root_reference: None,
            root_parent: true,
            state: Some(RefState::New),
            meta_checksum: None,
            content_checksum: None,
            content_type: None,
            crawl_date: None,
        }
    }

    /// Child reference discovered inside `parent` (an embedded document).
    /// The child points at the top-most root of its discovery chain.
    pub fn embedded(reference: impl Into<String>, parent: &CrawlRef) -> Self {
        let root = if parent.root_parent {
            Some(parent.reference.clone())
        } else {
            parent.parent_root_reference.clone()
        };
        Self {
            reference: reference.into(),
            parent_root_reference: root,
            root_parent: false,
            state: Some(RefState::New),
            meta_checksum: None,
            content_checksum: None,
            content_type: None,
            crawl_date: None,
        }
    }

    /// Fill every field this reference is missing from a cached entry.
    /// Used when a non new-or-modified crawl did not run the stages that
    /// gather this information, so the previous run's values survive.
    pub fn copy_missing_from(&mut self, cached: &CrawlRef) {
        if self.parent_root_reference.is_none() {
            self.parent_root_reference = cached.parent_root_reference.clone();
        }
        if self.meta_checksum.is_none() {
            self.meta_checksum = cached.meta_checksum.clone();
        }
        if self.content_checksum.is_none() {
            self.content_checksum = cached.content_checksum.clone();
        }
        if self.content_type.is_none() {
            self.content_type = cached.content_type.clone();
        }
        if self.crawl_date.is_none() {
            self.crawl_date = cached.crawl_date;
        }
    }

    pub fn stamp_crawl_date(&mut self) {
        self.crawl_date = Some(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        );
    }
}
