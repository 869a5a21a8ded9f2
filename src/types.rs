//! Core types for ccfetch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Language code of an output collection (e.g. `zho`, `rus`, `fas`)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Language(pub String);

impl Language {
    /// Create a new Language
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Get the language code
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Language {
    fn from(code: &str) -> Self {
        Self(code.to_string())
    }
}

/// Identifier of one record inside an archive file (the WARC record UUID)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    /// Create a new DocumentId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Path of an archive file relative to the retrieval endpoint
/// (e.g. `crawl-data/CC-MAIN-2021-04/segments/.../warc/....warc.gz`)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArchiveFile(pub String);

impl ArchiveFile {
    /// Create a new ArchiveFile
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Get the archive path
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the archive is gzip-compressed (judged by its extension)
    pub fn is_gzip(&self) -> bool {
        self.0.ends_with(".gz")
    }
}

impl std::fmt::Display for ArchiveFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ArchiveFile {
    fn from(path: &str) -> Self {
        Self(path.to_string())
    }
}

/// Expected content checksum. `None` accepts whatever content is found.
pub type ExpectedHash = Option<String>;

/// Languages that want a given record, with the checksum each expects
pub type WantedLanguages = BTreeMap<Language, ExpectedHash>;

/// Records wanted from one archive file
pub type WantedIds = BTreeMap<DocumentId, WantedLanguages>;

/// One line of a per-language manifest file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Record id inside the archive
    pub id: DocumentId,
    /// Archive containing the record
    pub cc_file: ArchiveFile,
    /// Expected content checksum, if the manifest provides one
    #[serde(default)]
    pub md5: Option<String>,
}

/// A retrieved document, one line of a language output file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Record id inside the archive
    pub id: DocumentId,
    /// Archive the record was read from
    pub cc_file: ArchiveFile,
    /// Publication time, when the page declares one
    pub time: Option<DateTime<Utc>>,
    /// Article title
    pub title: String,
    /// Article body text
    pub text: String,
    /// Target URI of the captured page
    pub url: String,
}

/// Lifecycle of one archive inside the task runner
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveState {
    /// Attempt `n` (1-based) in progress
    Attempting(u32),
    /// All wanted records found and validated
    Succeeded,
    /// Attempt budget exhausted
    Abandoned,
    /// Interrupted from outside, no further attempts
    Cancelled,
}

/// Progress events emitted while a run is in flight
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Dispatch began for this instance's selected archives
    RunStarted {
        /// Number of archives selected
        archives: usize,
    },

    /// An archive was dispatched to a worker
    ArchiveStarted {
        /// Archive being processed
        archive: ArchiveFile,
        /// Number of wanted records in it
        wanted: usize,
    },

    /// A wanted record turned up during the current attempt
    RecordFound {
        /// Archive being processed
        archive: ArchiveFile,
        /// Distinct wanted records found so far in this attempt
        found: usize,
        /// Wanted records in the archive
        wanted: usize,
    },

    /// An attempt failed and another one will be made
    ArchiveRetrying {
        /// Archive being processed
        archive: ArchiveFile,
        /// The attempt that failed (1-based)
        attempt: u32,
        /// Why it failed
        error: String,
    },

    /// Archive finished and its documents were committed
    ArchiveCompleted {
        /// Archive that completed
        archive: ArchiveFile,
        /// Number of records found
        found: usize,
        /// Attempts used
        attempts: u32,
    },

    /// Archive was given up on after exhausting its attempts
    ArchiveAbandoned {
        /// Archive that was abandoned
        archive: ArchiveFile,
        /// Attempts used
        attempts: u32,
        /// Last error seen
        error: String,
    },
}

/// Totals reported at the end of a run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Archives dispatched by this instance
    pub archives_attempted: usize,
    /// Archives whose documents were committed
    pub archives_succeeded: usize,
    /// Archives given up after all attempts
    pub archives_abandoned: usize,
    /// Documents written per language
    pub documents_written: BTreeMap<Language, usize>,
}

impl RunSummary {
    /// Total documents written across all languages
    pub fn total_documents(&self) -> usize {
        self.documents_written.values().sum()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_entry_without_md5_has_no_expected_hash() {
        let entry: ManifestEntry =
            serde_json::from_str(r#"{"id":"a1","cc_file":"f1.warc.gz"}"#).unwrap();

        assert_eq!(entry.id, DocumentId::from("a1"));
        assert_eq!(entry.cc_file, ArchiveFile::from("f1.warc.gz"));
        assert_eq!(entry.md5, None);
    }

    #[test]
    fn document_serializes_fields_in_output_order() {
        let doc = Document {
            id: "a1".into(),
            cc_file: "f1.warc.gz".into(),
            time: None,
            title: "标题".to_string(),
            text: "正文".to_string(),
            url: "https://example.com/".to_string(),
        };

        let line = serde_json::to_string(&doc).unwrap();

        assert_eq!(
            line,
            r#"{"id":"a1","cc_file":"f1.warc.gz","time":null,"title":"标题","text":"正文","url":"https://example.com/"}"#,
            "non-ASCII text must be written verbatim, not escaped"
        );
    }

    #[test]
    fn archive_gzip_detection_uses_extension() {
        assert!(ArchiveFile::from("a/b.warc.gz").is_gzip());
        assert!(!ArchiveFile::from("a/b.warc").is_gzip());
    }
}
