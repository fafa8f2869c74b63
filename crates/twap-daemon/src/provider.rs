//! File-backed reference upstream.
//!
//! Some external process keeps a JSON file current, e.g.
//! `{"rate": "1800.25", "last_updated_base": 1700000000, "last_updated_quote": 1700000000}`;
//! the daemon rereads it on every poll.

use std::path::PathBuf;

use twap_feeds::{FeedError, ReferenceData, ReferenceProvider};

/// Reads a [`ReferenceData`] document from disk.
#[derive(Debug, Clone)]
pub struct FileReferenceProvider {
    path: PathBuf,
}

impl FileReferenceProvider {
    /// A provider reading `path` on every call.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReferenceProvider for FileReferenceProvider {
    fn reference_data(&self, base: &str, quote: &str) -> twap_feeds::Result<ReferenceData> {
        let upstream = |e: &dyn std::fmt::Display| {
            FeedError::Upstream(format!("{base}/{quote} from {}: {e}", self.path.display()))
        };
        let content = std::fs::read_to_string(&self.path).map_err(|e| upstream(&e))?;
        serde_json::from_str(&content).map_err(|e| upstream(&e))
    }
}
