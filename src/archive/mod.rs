//! Archive record streams.
//!
//! - [`warc`] - Framing of a decompressed WARC byte stream into response records
//! - [`http`] - [`ArchiveSource`] that streams archives from a retrieval endpoint
//!
//! An [`ArchiveSource`] turns one archive path into a lazy [`RecordStream`] of
//! HTTP response records. Dropping the stream abandons the archive: nothing
//! further is read and the underlying connection is closed.

mod http;
mod warc;

pub use http::HttpArchiveSource;
pub use warc::{record_stream, strip_record_id};

use futures::stream::BoxStream;

use crate::error::Result;
use crate::types::{ArchiveFile, DocumentId};

/// One captured HTTP response from an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Record id (UUID without the `<urn:uuid:...>` wrapper)
    pub id: DocumentId,
    /// Page the response was captured from
    pub target_uri: Option<String>,
    /// HTTP response body (headers stripped)
    pub payload: Vec<u8>,
    /// Charset declared by the response's `Content-Type` header
    pub charset: Option<String>,
}

/// Lazy, finite, non-restartable sequence of records from one archive
pub type RecordStream = BoxStream<'static, Result<RawRecord>>;

/// Source of archive record streams
///
/// Implemented by [`HttpArchiveSource`] for real runs; tests substitute
/// in-memory sources.
#[async_trait::async_trait]
pub trait ArchiveSource: Send + Sync {
    /// Start streaming the response records of `archive`
    async fn open(&self, archive: &ArchiveFile) -> Result<RecordStream>;
}
