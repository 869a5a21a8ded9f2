use super::*;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::archive::{ArchiveSource, RawRecord, RecordStream};
use crate::config::{RetryConfig, ValidationMode};
use crate::extract::{Article, ArticleExtractor};
use crate::types::{Document, ManifestEntry};

/// Archives held in memory; `None` means the archive can never be fetched
struct MapSource {
    archives: HashMap<ArchiveFile, Option<Vec<String>>>,
    opened: AtomicUsize,
}

#[async_trait::async_trait]
impl ArchiveSource for MapSource {
    async fn open(&self, archive: &ArchiveFile) -> Result<RecordStream> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        match self.archives.get(archive) {
            Some(Some(ids)) => {
                let records: Vec<Result<RawRecord>> = ids
                    .iter()
                    .map(|id| {
                        Ok(RawRecord {
                            id: id.as_str().into(),
                            target_uri: Some(format!("https://news.example/{id}")),
                            payload: id.as_bytes().to_vec(),
                            charset: None,
                        })
                    })
                    .collect();
                Ok(futures::stream::iter(records).boxed())
            }
            _ => Err(Error::Io(std::io::Error::other("connection reset"))),
        }
    }
}

struct EchoExtractor;

impl ArticleExtractor for EchoExtractor {
    fn extract(&self, html: &str) -> Result<Article> {
        Ok(Article {
            title: html.to_string(),
            text: "body".to_string(),
            publish_time: None,
        })
    }
}

/// Index with `archives` archives, each wanting records `<archive>-r0` and `<archive>-r1` for zho
fn index_of(archives: usize) -> CaptureIndex {
    let mut index = CaptureIndex::new();
    for a in 0..archives {
        for r in 0..2 {
            index.insert(
                &Language::from("zho"),
                ManifestEntry {
                    id: format!("f{a:02}-r{r}").as_str().into(),
                    cc_file: format!("f{a:02}.warc.gz").as_str().into(),
                    md5: None,
                },
            );
        }
    }
    index
}

fn source_for(index: &CaptureIndex, broken: &[&str]) -> MapSource {
    let archives = index
        .archives()
        .map(|(archive, wanted)| {
            let records = if broken.contains(&archive.as_str()) {
                None
            } else {
                let mut ids: Vec<String> = wanted.keys().map(|id| id.0.clone()).collect();
                ids.push("unrelated".to_string());
                Some(ids)
            };
            (archive.clone(), records)
        })
        .collect();
    MapSource {
        archives,
        opened: AtomicUsize::new(0),
    }
}

fn context(source: Arc<dyn ArchiveSource>) -> (TaskContext, broadcast::Receiver<Event>) {
    let (event_tx, events) = broadcast::channel(256);
    let ctx = TaskContext {
        source,
        extractor: Arc::new(EchoExtractor),
        retry: RetryConfig {
            max_attempts: 2,
            jitter: false,
            ..RetryConfig::default()
        },
        validation: ValidationMode::Lenient,
        event_tx,
        cancel: CancellationToken::new(),
    };
    (ctx, events)
}

async fn read_docs(path: &std::path::Path) -> Vec<Document> {
    tokio::fs::read_to_string(path)
        .await
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

// --- select_archives ---

#[test]
fn shards_partition_the_index_exactly_once() {
    let index = index_of(23);
    let all: Vec<ArchiveFile> = index.archives().map(|(a, _)| a.clone()).collect();

    for count in 1..=7 {
        let mut seen = Vec::new();
        for shard_index in 0..count {
            let shard = ShardConfig {
                index: shard_index,
                count,
            };
            seen.extend(select_archives(&index, Some(shard), None));
        }
        seen.sort();
        assert_eq!(seen, all, "shard count {count} must cover every archive once");
    }
}

#[test]
fn unsharded_selection_is_the_whole_index_in_order() {
    let index = index_of(5);

    let selected = select_archives(&index, None, None);

    let names: Vec<&str> = selected.iter().map(|a| a.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "f00.warc.gz",
            "f01.warc.gz",
            "f02.warc.gz",
            "f03.warc.gz",
            "f04.warc.gz"
        ]
    );
}

#[test]
fn limit_caps_the_run_before_sharding() {
    let index = index_of(10);
    let shard = ShardConfig { index: 1, count: 3 };

    let selected = select_archives(&index, Some(shard), Some(4));

    let names: Vec<&str> = selected.iter().map(|a| a.as_str()).collect();
    assert_eq!(names, vec!["f01.warc.gz"]);
}

#[test]
fn limited_shards_together_attempt_exactly_the_limit() {
    let index = index_of(10);

    let mut seen = Vec::new();
    for shard_index in 0..3 {
        let shard = ShardConfig {
            index: shard_index,
            count: 3,
        };
        seen.extend(select_archives(&index, Some(shard), Some(4)));
    }
    seen.sort();

    let expected: Vec<ArchiveFile> = (0..4)
        .map(|a| ArchiveFile::from(format!("f{a:02}.warc.gz").as_str()))
        .collect();
    assert_eq!(seen, expected);
}

// --- Scheduler::run ---

#[tokio::test]
async fn parallel_run_commits_every_archive() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("zho").join("docs.jsonl");
    let index = Arc::new(index_of(12));
    let source = Arc::new(source_for(&index, &[]));
    let (ctx, _events) = context(source.clone());
    let (writer, tasks) =
        OutputWriter::open(BTreeMap::from([(Language::from("zho"), path.clone())]))
            .await
            .unwrap();

    let scheduler = Scheduler::new(ctx, Arc::clone(&index), Some(writer), 4);
    let summary = scheduler
        .run(select_archives(&index, None, None))
        .await
        .unwrap();
    drop(scheduler);
    tasks.join().await;

    assert_eq!(summary.archives_attempted, 12);
    assert_eq!(summary.archives_succeeded, 12);
    assert_eq!(summary.documents_written[&Language::from("zho")], 24);

    let docs = read_docs(&path).await;
    assert_eq!(docs.len(), 24);
    let unique: HashSet<_> = docs.iter().map(|d| d.id.clone()).collect();
    assert_eq!(unique.len(), 24, "no document may be written twice");
}

#[tokio::test]
async fn abandoned_archive_does_not_stop_the_others() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("docs.jsonl");
    let index = Arc::new(index_of(4));
    let source = Arc::new(source_for(&index, &["f02.warc.gz"]));
    let (ctx, mut events) = context(source.clone());
    let (writer, tasks) =
        OutputWriter::open(BTreeMap::from([(Language::from("zho"), path.clone())]))
            .await
            .unwrap();

    let scheduler = Scheduler::new(ctx, Arc::clone(&index), Some(writer), 2);
    let summary = scheduler
        .run(select_archives(&index, None, None))
        .await
        .unwrap();
    drop(scheduler);
    tasks.join().await;

    assert_eq!(summary.archives_succeeded, 3);
    assert_eq!(summary.archives_abandoned, 1);
    assert_eq!(read_docs(&path).await.len(), 6);

    let mut abandoned = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let Event::ArchiveAbandoned {
            archive, attempts, ..
        } = event
        {
            abandoned.push((archive, attempts));
        }
    }
    assert_eq!(abandoned, vec![(ArchiveFile::from("f02.warc.gz"), 2)]);
}

/// Panics while opening one archive, otherwise delegates
struct PanickingSource {
    inner: MapSource,
    panics_on: ArchiveFile,
}

#[async_trait::async_trait]
impl ArchiveSource for PanickingSource {
    async fn open(&self, archive: &ArchiveFile) -> Result<RecordStream> {
        if *archive == self.panics_on {
            panic!("decoder blew up on {archive}");
        }
        self.inner.open(archive).await
    }
}

#[tokio::test]
async fn panicking_archive_task_is_abandoned_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("docs.jsonl");
    let index = Arc::new(index_of(5));
    let source = Arc::new(PanickingSource {
        inner: source_for(&index, &[]),
        panics_on: ArchiveFile::from("f03.warc.gz"),
    });
    let (ctx, mut events) = context(source);
    let (writer, tasks) =
        OutputWriter::open(BTreeMap::from([(Language::from("zho"), path.clone())]))
            .await
            .unwrap();

    let scheduler = Scheduler::new(ctx, Arc::clone(&index), Some(writer), 3);
    let summary = scheduler
        .run(select_archives(&index, None, None))
        .await
        .unwrap();
    drop(scheduler);
    tasks.join().await;

    assert_eq!(summary.archives_attempted, 5);
    assert_eq!(summary.archives_succeeded, 4);
    assert_eq!(summary.archives_abandoned, 1);
    assert_eq!(read_docs(&path).await.len(), 8);

    let mut abandoned = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let Event::ArchiveAbandoned { archive, .. } = event {
            abandoned.push(archive);
        }
    }
    assert_eq!(abandoned, vec![ArchiveFile::from("f03.warc.gz")]);
}

#[tokio::test]
async fn sequential_run_follows_index_order() {
    let index = Arc::new(index_of(3));
    let source = Arc::new(source_for(&index, &[]));
    let (ctx, mut events) = context(source);

    let scheduler = Scheduler::new(ctx, Arc::clone(&index), None, 1);
    scheduler
        .run(select_archives(&index, None, None))
        .await
        .unwrap();

    let mut started = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let Event::ArchiveStarted { archive, .. } = event {
            started.push(archive.0);
        }
    }
    assert_eq!(started, vec!["f00.warc.gz", "f01.warc.gz", "f02.warc.gz"]);
}

#[tokio::test]
async fn dry_run_counts_successes_without_writing() {
    let index = Arc::new(index_of(3));
    let source = Arc::new(source_for(&index, &[]));
    let (ctx, _events) = context(source.clone());

    let scheduler = Scheduler::new(ctx, Arc::clone(&index), None, 2);
    let summary = scheduler
        .run(select_archives(&index, None, None))
        .await
        .unwrap();

    assert_eq!(summary.archives_succeeded, 3);
    assert_eq!(summary.total_documents(), 0);
    assert_eq!(source.opened.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn cancelled_run_dispatches_nothing() {
    let index = Arc::new(index_of(5));
    let source = Arc::new(source_for(&index, &[]));
    let (ctx, _events) = context(source.clone());
    ctx.cancel.cancel();

    for workers in [1, 3] {
        let scheduler = Scheduler::new(ctx.clone(), Arc::clone(&index), None, workers);
        let err = scheduler
            .run(select_archives(&index, None, None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
    assert_eq!(source.opened.load(Ordering::SeqCst), 0);
}
