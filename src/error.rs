//! Error types for ccfetch
//!
//! A single crate-wide [`Error`] covers every failure a run can hit. The variants
//! fall into three groups:
//! - run-fatal: configuration problems, cancellation, and output write failures
//! - per-archive and retryable: network, archive framing, extraction, hash mismatch,
//!   missing records (see [`crate::retry::IsRetryable`])
//! - plumbing: I/O and serialization errors surfaced from lower layers

use crate::types::{ArchiveFile, DocumentId, Language};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ccfetch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ccfetch
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or contradictory run options
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "shard")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error while fetching an archive
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The archive stream could not be framed into records
    #[error("malformed archive {archive}: {message}")]
    MalformedArchive {
        /// Archive being read
        archive: ArchiveFile,
        /// What was wrong with it
        message: String,
    },

    /// Article extraction failed for a record
    #[error("extraction error: {0}")]
    Extraction(String),

    /// Extracted content does not match the expected checksum (strict mode)
    #[error("md5 hash not matched in {language} for record {id}: expecting {expected} but got {got}")]
    HashMismatch {
        /// Record whose content mismatched
        id: DocumentId,
        /// Language that expected the checksum
        language: Language,
        /// Checksum from the manifest
        expected: String,
        /// Checksum of the extracted content
        got: String,
    },

    /// The archive ended before every wanted record was seen (strict mode)
    #[error("not finding all needed docs in {archive}: found {found} of {wanted}")]
    WantedIdsNotFound {
        /// Archive that was read to the end
        archive: ArchiveFile,
        /// Records found
        found: usize,
        /// Records wanted
        wanted: usize,
    },

    /// A batch could not be persisted to its output file
    #[error("failed to write output file {path}: {source}")]
    Output {
        /// Output file being appended to
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The run was interrupted from outside
    #[error("run cancelled")]
    Cancelled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a config key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Whether this error ends the whole run rather than a single archive
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config { .. } | Error::Cancelled | Error::Output { .. }
        )
    }
}
