//! Concurrent output writer.
//!
//! Every output file is owned by exactly one background task. Workers hand it
//! whole batches over a channel and wait for an acknowledgement, so lines from
//! different archives never interleave mid-line and a batch is on disk before
//! the archive counts as committed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::types::{Document, Language};

/// Buffer size for each output file's batch channel
const WRITE_CHANNEL_BUFFER: usize = 32;

/// A batch waiting to be appended, with the channel its result goes back on
struct WriteRequest {
    docs: Vec<Document>,
    ack: oneshot::Sender<Result<usize>>,
}

/// Channel into one output file's writer task
struct Sink {
    path: PathBuf,
    tx: mpsc::Sender<WriteRequest>,
}

/// Cloneable handle for appending document batches to per-language output files.
#[derive(Clone)]
pub struct OutputWriter {
    sinks: Arc<BTreeMap<Language, Sink>>,
}

/// Background tasks behind an [`OutputWriter`]
pub struct WriterTasks {
    handles: Vec<JoinHandle<()>>,
}

impl OutputWriter {
    /// Open (creating if needed) every output file in append mode and spawn its writer task.
    pub async fn open(paths: BTreeMap<Language, PathBuf>) -> Result<(Self, WriterTasks)> {
        let mut sinks = BTreeMap::new();
        let mut handles = Vec::with_capacity(paths.len());

        for (lang, path) in paths {
            let file = open_append(&path).await?;
            let (tx, rx) = mpsc::channel(WRITE_CHANNEL_BUFFER);
            handles.push(spawn_sink(path.clone(), file, rx));
            sinks.insert(lang, Sink { path, tx });
        }

        Ok((
            Self {
                sinks: Arc::new(sinks),
            },
            WriterTasks { handles },
        ))
    }

    /// Append `docs` as complete lines to the language's output file.
    ///
    /// Returns once the batch is written and flushed. Returns the number of
    /// documents written.
    pub async fn append(&self, lang: &Language, docs: Vec<Document>) -> Result<usize> {
        let sink = self
            .sinks
            .get(lang)
            .ok_or_else(|| Error::Other(format!("no output file for language {lang}")))?;
        if docs.is_empty() {
            return Ok(0);
        }

        let (ack, done) = oneshot::channel();
        sink.tx
            .send(WriteRequest { docs, ack })
            .await
            .map_err(|_| writer_stopped(&sink.path))?;
        done.await.map_err(|_| writer_stopped(&sink.path))?
    }
}

impl WriterTasks {
    /// Wait for every writer task to drain and close its file.
    ///
    /// Tasks finish once every [`OutputWriter`] clone has been dropped.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Output writer task panicked");
            }
        }
    }
}

async fn open_append(path: &Path) -> Result<File> {
    let output_error = |source| Error::Output {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(output_error)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(output_error)
}

fn spawn_sink(
    path: PathBuf,
    mut file: File,
    mut rx: mpsc::Receiver<WriteRequest>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            let result = write_batch(&mut file, &path, &request.docs).await;
            if let Err(e) = &result {
                tracing::error!(path = %path.display(), error = %e, "Failed to append batch");
            }
            request.ack.send(result).ok();
        }
        tracing::debug!(path = %path.display(), "Output writer closed");
    })
}

/// Serialize the whole batch up front so it lands with a single write
async fn write_batch(file: &mut File, path: &Path, docs: &[Document]) -> Result<usize> {
    let mut buf = Vec::new();
    for doc in docs {
        serde_json::to_writer(&mut buf, doc)?;
        buf.push(b'\n');
    }

    let output_error = |source| Error::Output {
        path: path.to_path_buf(),
        source,
    };
    file.write_all(&buf).await.map_err(output_error)?;
    file.flush().await.map_err(output_error)?;
    Ok(docs.len())
}

fn writer_stopped(path: &Path) -> Error {
    Error::Output {
        path: path.to_path_buf(),
        source: std::io::Error::other("output writer stopped"),
    }
}
