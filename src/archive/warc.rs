//! WARC record framing over a decompressed byte stream.

use futures::StreamExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use super::{RawRecord, RecordStream};
use crate::error::{Error, Result};
use crate::extract::charset_label;
use crate::types::{ArchiveFile, DocumentId};

/// Header lines of one WARC record, names lowercased
struct RecordHeader {
    fields: Vec<(String, String)>,
}

impl RecordHeader {
    fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn content_length(&self, archive: &ArchiveFile) -> Result<u64> {
        let raw = self
            .get("content-length")
            .ok_or_else(|| malformed(archive, "record without Content-Length"))?;
        raw.parse()
            .map_err(|_| malformed(archive, format!("invalid Content-Length '{raw}'")))
    }

    /// HTTP response captures; requests, metadata and warcinfo are skipped
    fn is_http_response(&self) -> bool {
        self.get("warc-type") == Some("response")
            && self
                .get("content-type")
                .is_some_and(|ct| ct.starts_with("application/http"))
    }
}

/// Stream the HTTP response records of a WARC archive.
///
/// `reader` must yield the decompressed archive bytes. The stream ends at a
/// clean end of input; a stream that stops inside a record yields an error.
pub fn record_stream<R>(archive: ArchiveFile, reader: R) -> RecordStream
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    futures::stream::try_unfold((archive, reader), |(archive, mut reader)| async move {
        match next_response(&archive, &mut reader).await? {
            Some(record) => Ok(Some((record, (archive, reader)))),
            None => Ok(None),
        }
    })
    .boxed()
}

/// Extract the UUID from a `WARC-Record-ID` value like `<urn:uuid:...>`
pub fn strip_record_id(raw: &str) -> &str {
    match raw.split_once("uuid:") {
        Some((_, rest)) => rest.split('>').next().unwrap_or(rest),
        None => raw.trim_start_matches('<').trim_end_matches('>'),
    }
}

async fn next_response<R>(archive: &ArchiveFile, reader: &mut R) -> Result<Option<RawRecord>>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let Some(header) = read_header(archive, reader).await? else {
            return Ok(None);
        };
        let length = header.content_length(archive)?;

        if !header.is_http_response() {
            let skipped = tokio::io::copy(&mut (&mut *reader).take(length), &mut tokio::io::sink())
                .await?;
            if skipped < length {
                return Err(truncated(archive));
            }
            continue;
        }

        let raw_id = header
            .get("warc-record-id")
            .ok_or_else(|| malformed(archive, "response record without WARC-Record-ID"))?;
        let id = DocumentId::new(strip_record_id(raw_id));
        let target_uri = header.get("warc-target-uri").map(str::to_string);

        // Grows with the bytes actually read; the header length is untrusted
        let mut block = Vec::new();
        (&mut *reader).take(length).read_to_end(&mut block).await?;
        if (block.len() as u64) < length {
            return Err(truncated(archive));
        }

        let (head, payload) = split_http(block);
        return Ok(Some(RawRecord {
            id,
            target_uri,
            payload,
            charset: header_charset(&head),
        }));
    }
}

/// Read the version line and header fields of the next record.
///
/// Blank lines between records are skipped. `None` at a clean end of input.
async fn read_header<R>(archive: &ArchiveFile, reader: &mut R) -> Result<Option<RecordHeader>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(None);
        }
        if !trim_eol(&line).is_empty() {
            break;
        }
    }

    if !trim_eol(&line).starts_with(b"WARC/") {
        return Err(malformed(archive, "expected WARC version line"));
    }

    let mut fields = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Err(truncated(archive));
        }
        let text = String::from_utf8_lossy(trim_eol(&line));
        if text.is_empty() {
            break;
        }
        if let Some((name, value)) = text.split_once(':') {
            fields.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }

    Ok(Some(RecordHeader { fields }))
}

/// Split a captured HTTP response into its header block and body at the
/// first blank line. Without one the whole block is header.
fn split_http(mut block: Vec<u8>) -> (Vec<u8>, Vec<u8>) {
    let split = find(&block, b"\r\n\r\n")
        .map(|pos| pos + 4)
        .or_else(|| find(&block, b"\n\n").map(|pos| pos + 2));
    match split {
        Some(start) => {
            let body = block.split_off(start);
            (block, body)
        }
        None => (block, Vec::new()),
    }
}

/// Charset parameter of the HTTP `Content-Type` header
fn header_charset(head: &[u8]) -> Option<String> {
    String::from_utf8_lossy(head)
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-type"))
        .and_then(|(_, value)| charset_label(value))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn trim_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn malformed(archive: &ArchiveFile, message: impl Into<String>) -> Error {
    Error::MalformedArchive {
        archive: archive.clone(),
        message: message.into(),
    }
}

fn truncated(archive: &ArchiveFile) -> Error {
    malformed(archive, "stream ended inside a record")
}
