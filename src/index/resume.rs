//! Resume state: ids already present in each language's output file.

use std::collections::{BTreeMap, HashSet};
use std::io::SeekFrom;
use std::path::Path;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader};

use crate::error::Result;
use crate::types::{DocumentId, Language};

/// Chunk size used when scanning an output file backwards for its last newline
const TAIL_SCAN_CHUNK: u64 = 64 * 1024;

/// Only the id of an output line matters for resumption
#[derive(Deserialize)]
struct OutputLineId {
    id: DocumentId,
}

/// Per-language sets of already-persisted document ids
#[derive(Debug, Clone, Default)]
pub struct ResumeState {
    downloaded: BTreeMap<Language, HashSet<DocumentId>>,
}

impl ResumeState {
    /// Empty state (fresh or restarted run)
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan an existing output file into the state for `lang`.
    ///
    /// A missing file contributes nothing. A partial last line left by a crash is
    /// cut off first so later appends start on a clean line.
    pub async fn load(&mut self, lang: &Language, path: &Path) -> Result<usize> {
        if !tokio::fs::try_exists(path).await? {
            return Ok(0);
        }
        repair_partial_tail(path).await?;
        let ids = read_downloaded_ids(path).await?;
        let count = ids.len();
        tracing::info!(
            "Resuming -- already downloaded {} {} docs.",
            count,
            lang
        );
        self.extend(lang, ids);
        Ok(count)
    }

    /// Record ids for a language directly
    pub fn extend(&mut self, lang: &Language, ids: impl IntoIterator<Item = DocumentId>) {
        self.downloaded.entry(lang.clone()).or_default().extend(ids);
    }

    /// Whether `id` is already persisted for `lang`
    pub fn contains(&self, lang: &Language, id: &DocumentId) -> bool {
        self.downloaded
            .get(lang)
            .is_some_and(|ids| ids.contains(id))
    }

    /// Number of persisted ids for `lang`
    pub fn count(&self, lang: &Language) -> usize {
        self.downloaded.get(lang).map_or(0, HashSet::len)
    }
}

/// Collect the `id` of every line in an output file.
///
/// Lines that do not parse are skipped with a warning; they cannot be matched
/// to a manifest entry anyway.
pub async fn read_downloaded_ids(path: &Path) -> Result<HashSet<DocumentId>> {
    let file = tokio::fs::File::open(path).await?;
    let mut lines = BufReader::new(file).lines();
    let mut ids = HashSet::new();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<OutputLineId>(&line) {
            Ok(parsed) => {
                ids.insert(parsed.id);
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    line = line_no,
                    error = %e,
                    "Skipping unreadable output line"
                );
            }
        }
    }

    Ok(ids)
}

/// Truncate a file back to its last complete line.
///
/// Returns true if the file was changed.
pub async fn repair_partial_tail(path: &Path) -> Result<bool> {
    let mut file = tokio::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .await?;
    let len = file.metadata().await?.len();
    if len == 0 {
        return Ok(false);
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1)).await?;
    file.read_exact(&mut last).await?;
    if last[0] == b'\n' {
        return Ok(false);
    }

    // Walk backwards until a newline is found; everything after it is a torn write
    let mut end = len;
    let mut keep = 0u64;
    let mut buf = vec![0u8; TAIL_SCAN_CHUNK as usize];
    while end > 0 {
        let start = end.saturating_sub(TAIL_SCAN_CHUNK);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start)).await?;
        file.read_exact(chunk).await?;
        if let Some(pos) = chunk.iter().rposition(|b| *b == b'\n') {
            keep = start + pos as u64 + 1;
            break;
        }
        end = start;
    }

    file.set_len(keep).await?;
    file.sync_all().await?;
    tracing::warn!(
        path = %path.display(),
        dropped_bytes = len - keep,
        "Output file ended with a partial line, truncated to last complete line"
    );
    Ok(true)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const TWO_DOCS: &str = concat!(
        r#"{"id":"a1","cc_file":"f1","time":null,"title":"t","text":"x","url":"u"}"#,
        "\n",
        r#"{"id":"a2","cc_file":"f1","time":null,"title":"t","text":"y","url":"u"}"#,
        "\n",
    );

    #[tokio::test]
    async fn load_collects_ids_per_language() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.jsonl");
        tokio::fs::write(&path, TWO_DOCS).await.unwrap();
        let zho = Language::from("zho");

        let mut state = ResumeState::new();
        let count = state.load(&zho, &path).await.unwrap();

        assert_eq!(count, 2);
        assert!(state.contains(&zho, &DocumentId::from("a1")));
        assert!(state.contains(&zho, &DocumentId::from("a2")));
        assert!(!state.contains(&Language::from("rus"), &DocumentId::from("a1")));
    }

    #[tokio::test]
    async fn missing_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = ResumeState::new();

        let count = state
            .load(&Language::from("fas"), &dir.path().join("absent.jsonl"))
            .await
            .unwrap();

        assert_eq!(count, 0);
        assert_eq!(state.count(&Language::from("fas")), 0);
    }

    #[tokio::test]
    async fn partial_tail_is_truncated_before_scanning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.jsonl");
        let torn = format!("{TWO_DOCS}{{\"id\":\"a3\",\"cc_fi");
        tokio::fs::write(&path, &torn).await.unwrap();

        let mut state = ResumeState::new();
        let count = state.load(&Language::from("zho"), &path).await.unwrap();

        assert_eq!(count, 2, "torn line must not count as downloaded");
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents, TWO_DOCS);
    }

    #[tokio::test]
    async fn file_without_any_newline_is_emptied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.jsonl");
        tokio::fs::write(&path, "{\"id\":").await.unwrap();

        assert!(repair_partial_tail(&path).await.unwrap());
        assert_eq!(tokio::fs::metadata(&path).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn complete_file_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.jsonl");
        tokio::fs::write(&path, TWO_DOCS).await.unwrap();

        assert!(!repair_partial_tail(&path).await.unwrap());
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), TWO_DOCS);
    }

    #[tokio::test]
    async fn unreadable_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.jsonl");
        tokio::fs::write(&path, format!("garbage\n{TWO_DOCS}"))
            .await
            .unwrap();

        let ids = read_downloaded_ids(&path).await.unwrap();

        assert_eq!(ids.len(), 2);
    }
}
