//! HTTP archive source: streams `<base_url><archive>` and frames it on the fly.

use async_compression::tokio::bufread::GzipDecoder;
use futures::TryStreamExt;
use tokio::io::{AsyncBufRead, BufReader};
use tokio_util::io::StreamReader;

use super::{ArchiveSource, RecordStream, record_stream};
use crate::error::Result;
use crate::types::ArchiveFile;

/// [`ArchiveSource`] backed by a plain HTTP(S) endpoint such as `https://data.commoncrawl.org/`
#[derive(Clone)]
pub struct HttpArchiveSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpArchiveSource {
    /// Create a source for archives below `base_url`
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ccfetch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create a source reusing an existing client
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Full URL of an archive: the base URL followed by the archive path
    pub fn archive_url(&self, archive: &ArchiveFile) -> String {
        format!("{}{}", self.base_url, archive.as_str())
    }
}

#[async_trait::async_trait]
impl ArchiveSource for HttpArchiveSource {
    async fn open(&self, archive: &ArchiveFile) -> Result<RecordStream> {
        let url = self.archive_url(archive);
        tracing::debug!(url = %url, "Opening archive");

        let response = self.client.get(&url).send().await?.error_for_status()?;
        let body = StreamReader::new(Box::pin(
            response.bytes_stream().map_err(std::io::Error::other),
        ));

        // WARC.gz files are a concatenation of one gzip member per record
        let reader: Box<dyn AsyncBufRead + Unpin + Send> = if archive.is_gzip() {
            let mut decoder = GzipDecoder::new(body);
            decoder.multiple_members(true);
            Box::new(BufReader::new(decoder))
        } else {
            Box::new(body)
        };

        Ok(record_stream(archive.clone(), reader))
    }
}
