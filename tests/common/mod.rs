//! Common test utilities for ccfetch pipeline tests

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use ccfetch::{
    Article, ArchiveFile, ArchiveSource, ArticleExtractor, Config, Document, RawRecord,
    RecordStream, RetryConfig, Result,
};
use futures::StreamExt;
use tracing_subscriber::fmt::MakeWriter;

/// Text every page extracts to
pub const BODY: &str = "body";

/// In-memory archives, with an optional number of failed opens per archive.
#[derive(Default)]
pub struct MemorySource {
    archives: HashMap<ArchiveFile, Vec<RawRecord>>,
    failures: Mutex<HashMap<ArchiveFile, usize>>,
    opened: Mutex<HashMap<ArchiveFile, usize>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an archive holding `ids` in order; each payload is the id itself
    pub fn with_archive(mut self, archive: &str, ids: &[&str]) -> Self {
        let records = ids
            .iter()
            .map(|id| RawRecord {
                id: (*id).into(),
                target_uri: Some(format!("https://news.example/{id}")),
                payload: id.as_bytes().to_vec(),
                charset: None,
            })
            .collect();
        self.archives.insert(archive.into(), records);
        self
    }

    /// Make the first `count` opens of `archive` fail with a connection error
    pub fn failing_first(self, archive: &str, count: usize) -> Self {
        self.failures.lock().unwrap().insert(archive.into(), count);
        self
    }

    /// How many times `archive` has been opened
    pub fn opened(&self, archive: &str) -> usize {
        self.opened
            .lock()
            .unwrap()
            .get(&ArchiveFile::from(archive))
            .copied()
            .unwrap_or(0)
    }

    /// Archives opened at least once
    pub fn opened_archives(&self) -> Vec<ArchiveFile> {
        let mut opened: Vec<_> = self.opened.lock().unwrap().keys().cloned().collect();
        opened.sort();
        opened
    }
}

#[async_trait::async_trait]
impl ArchiveSource for MemorySource {
    async fn open(&self, archive: &ArchiveFile) -> Result<RecordStream> {
        *self.opened.lock().unwrap().entry(archive.clone()).or_default() += 1;

        if let Some(remaining) = self.failures.lock().unwrap().get_mut(archive)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(ccfetch::Error::Io(std::io::Error::other(
                "connection reset by peer",
            )));
        }

        let records = self.archives.get(archive).cloned().unwrap_or_default();
        Ok(futures::stream::iter(records.into_iter().map(Ok)).boxed())
    }
}

/// Extractor titling each page with its payload; counts pages per id
#[derive(Default)]
pub struct CountingExtractor {
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl CountingExtractor {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl ArticleExtractor for CountingExtractor {
    fn extract(&self, html: &str) -> Result<Article> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let title = html.to_string();
        self.seen.lock().unwrap().push(title.clone());
        Ok(Article {
            title,
            text: BODY.to_string(),
            publish_time: None,
        })
    }
}

/// Checksum the counting extractor's document for `id` will have
pub fn hash_of(id: &str) -> String {
    format!("{:x}", md5::compute(format!("{id}{BODY}")))
}

/// Write a manifest with `(id, cc_file, md5)` rows
pub fn write_manifest(dir: &Path, name: &str, rows: &[(&str, &str, Option<String>)]) -> PathBuf {
    let path = dir.join(name);
    let mut content = String::new();
    for (id, cc_file, md5) in rows {
        let line = match md5 {
            Some(md5) => serde_json::json!({ "id": id, "cc_file": cc_file, "md5": md5 }),
            None => serde_json::json!({ "id": id, "cc_file": cc_file }),
        };
        content.push_str(&line.to_string());
        content.push('\n');
    }
    std::fs::write(&path, content).unwrap();
    path
}

/// Config for a run storing into `storage` with near-instant retries
pub fn test_config(storage: &Path, manifests: BTreeMap<&str, Vec<PathBuf>>) -> Config {
    Config {
        storage_dir: storage.to_path_buf(),
        manifests: manifests
            .into_iter()
            .map(|(lang, files)| (lang.into(), files))
            .collect(),
        workers: 4,
        retry: RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            jitter: false,
        },
        ..Default::default()
    }
}

/// Documents in an output file, in file order; a missing file is empty
pub fn read_output(path: &Path) -> Vec<Document> {
    match std::fs::read_to_string(path) {
        Ok(content) => content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => panic!("failed to read {}: {e}", path.display()),
    }
}

/// Ids in an output file, in file order
pub fn read_ids(path: &Path) -> Vec<String> {
    read_output(path)
        .into_iter()
        .map(|doc| doc.id.as_str().to_string())
        .collect()
}

/// Log output collected in memory, for asserting on the lines a run emits
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Subscriber writing plain (uncoloured) lines into this buffer
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish()
    }

    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Lines containing `needle`
    pub fn matching(&self, needle: &str) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|line| line.contains(needle))
            .collect()
    }
}

pub struct CapturedWriter(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for CapturedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CapturedWriter(Arc::clone(&self.0))
    }
}
