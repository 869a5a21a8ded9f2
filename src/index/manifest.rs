//! Manifest reading: one `{id, cc_file, md5?}` JSON object per line, plain or gzipped.

use std::path::{Path, PathBuf};

use async_compression::tokio::bufread::GzipDecoder;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use crate::error::Result;
use crate::types::ManifestEntry;

type BoxedLines = Lines<Box<dyn AsyncBufRead + Unpin + Send>>;

/// Streaming reader over the entries of one manifest file
pub struct ManifestReader {
    path: PathBuf,
    lines: BoxedLines,
    line_no: usize,
}

impl ManifestReader {
    /// Open a manifest; files ending in `.gz` are decompressed on the fly.
    pub async fn open(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        let reader: Box<dyn AsyncBufRead + Unpin + Send> = if is_gzip(path) {
            let mut decoder = GzipDecoder::new(BufReader::new(file));
            decoder.multiple_members(true);
            Box::new(BufReader::new(decoder))
        } else {
            Box::new(BufReader::new(file))
        };

        Ok(Self {
            path: path.to_path_buf(),
            lines: reader.lines(),
            line_no: 0,
        })
    }

    /// Next entry, skipping blank lines. `None` at end of file.
    pub async fn next_entry(&mut self) -> Result<Option<ManifestEntry>> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            return match serde_json::from_str(line) {
                Ok(entry) => Ok(Some(entry)),
                Err(e) => {
                    tracing::error!(
                        path = %self.path.display(),
                        line = self.line_no,
                        error = %e,
                        "Malformed manifest line"
                    );
                    Err(e.into())
                }
            };
        }
        Ok(None)
    }

    /// Path of the manifest being read
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}
