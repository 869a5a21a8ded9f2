//! End-to-end retrieval run: manifests in, per-language JSON lines out.
//!
//! A run goes through these phases:
//! 1. Apply the run mode to existing output (delete, refuse, or scan for resume)
//! 2. Build the capture index from the manifests, minus already-persisted ids
//! 3. Select this instance's archives (limit, then shard)
//! 4. Open the output writer unless this is a dry run
//! 5. Drive every selected archive through the scheduler

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::archive::{ArchiveSource, HttpArchiveSource};
use crate::config::{Config, RunMode};
use crate::error::{Error, Result};
use crate::extract::{ArticleExtractor, HtmlArticleExtractor};
use crate::index::{ResumeState, build_capture_index};
use crate::scheduler::{Scheduler, select_archives};
use crate::task::TaskContext;
use crate::types::{Event, Language, RunSummary};
use crate::writer::OutputWriter;

/// Buffer size of the progress event channel
const EVENT_CHANNEL_BUFFER: usize = 1000;

/// A configured retrieval run.
///
/// # Example
///
/// ```no_run
/// use ccfetch::{Config, Pipeline};
///
/// # async fn example() -> ccfetch::Result<()> {
/// let mut config = Config::default();
/// config
///     .manifests
///     .insert("zho".into(), vec!["ids/zho.jsonl.gz".into()]);
///
/// let pipeline = Pipeline::new(config)?;
/// let mut events = pipeline.subscribe();
/// tokio::spawn(async move {
///     while let Ok(event) = events.recv().await {
///         println!("{event:?}");
///     }
/// });
///
/// let summary = pipeline.run().await?;
/// println!("wrote {} documents", summary.total_documents());
/// # Ok(())
/// # }
/// ```
pub struct Pipeline {
    config: Config,
    source: Arc<dyn ArchiveSource>,
    extractor: Arc<dyn ArticleExtractor>,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Validate `config` and set up the HTTP source and HTML extractor
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let source = HttpArchiveSource::new(config.base_url.clone())?;
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_BUFFER);
        Ok(Self {
            config,
            source: Arc::new(source),
            extractor: Arc::new(HtmlArticleExtractor::new()),
            event_tx,
            cancel: CancellationToken::new(),
        })
    }

    /// Replace the archive source
    pub fn with_source(mut self, source: Arc<dyn ArchiveSource>) -> Self {
        self.source = source;
        self
    }

    /// Replace the article extractor
    pub fn with_extractor(mut self, extractor: Arc<dyn ArticleExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Subscribe to progress events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that cancels this run when triggered
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute the run.
    ///
    /// Per-archive failures are reflected in the summary. Configuration
    /// problems, output failures and cancellation end the run with an error.
    pub async fn run(&self) -> Result<RunSummary> {
        tokio::fs::create_dir_all(&self.config.storage_dir).await?;

        let outputs = self.output_paths();
        let resume = prepare_outputs(&outputs, self.config.run_mode).await?;
        let index = Arc::new(build_capture_index(&self.config.manifests, &resume).await?);
        let archives = select_archives(&index, self.config.shard, self.config.limit);
        if let Some(shard) = self.config.shard {
            tracing::info!(
                shard = shard.index,
                shards = shard.count,
                archives = archives.len(),
                "Selected shard archives"
            );
        }

        let (writer, writer_tasks) = if self.config.dry_run {
            tracing::info!("Dry run, no output will be written");
            (None, None)
        } else {
            let (writer, tasks) = OutputWriter::open(outputs).await?;
            (Some(writer), Some(tasks))
        };

        let scheduler = Scheduler::new(
            self.task_context(),
            Arc::clone(&index),
            writer,
            self.config.workers,
        );
        let result = scheduler.run(archives).await;

        drop(scheduler);
        if let Some(tasks) = writer_tasks {
            tasks.join().await;
        }
        result
    }

    fn output_paths(&self) -> BTreeMap<Language, PathBuf> {
        self.config
            .languages()
            .map(|lang| (lang.clone(), self.config.output_path(lang)))
            .collect()
    }

    fn task_context(&self) -> TaskContext {
        TaskContext {
            source: Arc::clone(&self.source),
            extractor: Arc::clone(&self.extractor),
            retry: self.config.retry.clone(),
            validation: self.config.validation,
            event_tx: self.event_tx.clone(),
            // Scheduler-side cancellation stays inside this run
            cancel: self.cancel.child_token(),
        }
    }
}

/// Apply the run mode to each language's existing output file.
///
/// Restart deletes it, a fresh run refuses to touch it, resume scans it.
pub async fn prepare_outputs(
    outputs: &BTreeMap<Language, PathBuf>,
    mode: RunMode,
) -> Result<ResumeState> {
    let mut resume = ResumeState::new();
    for (lang, path) in outputs {
        if !tokio::fs::try_exists(path).await? {
            continue;
        }
        match mode {
            RunMode::Restart => {
                tracing::warn!("{} exists, will delete for restart.", path.display());
                tokio::fs::remove_file(path).await?;
            }
            RunMode::Fresh => {
                return Err(Error::config(
                    format!(
                        "File {} already exists (use resume or restart)",
                        path.display()
                    ),
                    "run_mode",
                ));
            }
            RunMode::Resume => {
                resume.load(lang, path).await?;
            }
        }
    }
    Ok(resume)
}
