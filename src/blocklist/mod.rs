//! Block-list of device-name substrings
//!
//! Devices whose display name contains any entry of the block-list never get
//! keepalive playback. The list is read from a plain text file, one substring
//! per line.

pub mod watcher;

use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub use watcher::BlockListWatcher;

const BOM: char = '\u{feff}';

/// Ordered set of non-empty, trimmed device-name substrings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockList {
    entries: Arc<[String]>,
}

impl BlockList {
    /// An empty list; blocks nothing
    pub fn empty() -> Self {
        Self {
            entries: Vec::<String>::new().into(),
        }
    }

    /// Parse block-list text.
    ///
    /// A leading byte-order mark is dropped, lines may end in `\n` or `\r\n`,
    /// spaces and tabs around each entry are trimmed and blank lines are
    /// discarded. Order is preserved.
    pub fn parse(text: &str) -> Self {
        let text = text.strip_prefix(BOM).unwrap_or(text);

        let entries: Vec<String> = text
            .lines()
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .map(|line| line.trim_matches(|c: char| c == ' ' || c == '\t'))
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect();

        Self {
            entries: entries.into(),
        }
    }

    /// Load the block-list from a file.
    ///
    /// A missing or unreadable file yields an empty list so the keepalive
    /// still runs everywhere.
    pub fn load(path: &Path) -> Self {
        match std::fs::read(path) {
            Ok(bytes) => {
                let list = Self::parse(&String::from_utf8_lossy(&bytes));
                info!(
                    "Loaded blocked device list ({} entries) from {}",
                    list.len(),
                    path.display()
                );
                list
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Blocked device list not found at {}, no device is blocked",
                    path.display()
                );
                Self::empty()
            }
            Err(e) => {
                warn!(
                    "Failed to read blocked device list {}: {} (no device is blocked)",
                    path.display(),
                    e
                );
                Self::empty()
            }
        }
    }

    /// True iff any entry is a substring of `name` (case-sensitive)
    pub fn is_blocked(&self, name: &str) -> bool {
        self.matching_entry(name).is_some()
    }

    /// First entry contained in `name`, if any
    pub fn matching_entry(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .map(String::as_str)
            .find(|entry| name.contains(*entry))
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for BlockList {
    fn default() -> Self {
        Self::empty()
    }
}

impl<S: Into<String>> FromIterator<S> for BlockList {
    /// Build a list from raw entries, applying the same trimming rules as
    /// [`BlockList::parse`].
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let entries: Vec<String> = iter
            .into_iter()
            .map(Into::into)
            .map(|s| s.trim_matches(|c: char| c == ' ' || c == '\t').to_owned())
            .filter(|s| !s.is_empty())
            .collect();
        Self {
            entries: entries.into(),
        }
    }
}
