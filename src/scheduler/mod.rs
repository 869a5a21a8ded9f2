//! Work scheduler: decides which archives this instance handles and drives
//! an archive task for each of them.
//!
//! Selection is deterministic. The capture index iterates archives in sorted
//! order, the optional limit caps that list for the whole run, and a shard
//! then keeps the positions where `position % count == index`. Independent
//! instances therefore agree on the split without talking to each other, and
//! a limited sharded run attempts `limit` archives across all instances.
//!
//! Dispatch runs archives one after another when `workers` is 1, otherwise it
//! keeps up to `workers` archive tasks in flight on the runtime and consumes
//! their results in completion order. Successful archives are committed to the
//! output writer from inside their task before the next archive is taken.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::StreamExt;

use crate::config::ShardConfig;
use crate::error::{Error, Result};
use crate::index::CaptureIndex;
use crate::task::{ArchiveOutcome, TaskContext, run_archive};
use crate::types::{ArchiveFile, Event, Language, RunSummary};
use crate::writer::OutputWriter;

/// What happened to one dispatched archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveReport {
    /// Documents were committed (or would have been, in a dry run)
    Committed {
        /// Documents written per language; empty in a dry run
        written: BTreeMap<Language, usize>,
    },
    /// Attempts were exhausted; nothing was written
    Abandoned,
    /// The run was cancelled before the archive finished
    Cancelled,
}

/// Archives this instance is responsible for, in index order.
pub fn select_archives(
    index: &CaptureIndex,
    shard: Option<ShardConfig>,
    limit: Option<usize>,
) -> Vec<ArchiveFile> {
    index
        .archives()
        .take(limit.unwrap_or(usize::MAX))
        .enumerate()
        .filter(|(position, _)| shard.is_none_or(|s| s.owns(*position)))
        .map(|(_, (archive, _))| archive.clone())
        .collect()
}

/// Drives archive tasks over a fixed-size worker pool.
pub struct Scheduler {
    ctx: TaskContext,
    index: Arc<CaptureIndex>,
    writer: Option<OutputWriter>,
    workers: usize,
}

impl Scheduler {
    /// Create a scheduler. Without a writer the run is a dry run.
    pub fn new(
        ctx: TaskContext,
        index: Arc<CaptureIndex>,
        writer: Option<OutputWriter>,
        workers: usize,
    ) -> Self {
        Self {
            ctx,
            index,
            writer,
            workers: workers.max(1),
        }
    }

    /// Process `archives` and return the run totals.
    ///
    /// Per-archive failures are counted, never returned. A panicking archive
    /// task counts as abandoned. An output failure stops dispatching and
    /// cancels in-flight archives. After cancellation
    /// every in-flight archive is allowed to unwind before `Cancelled` is
    /// returned.
    pub async fn run(&self, archives: Vec<ArchiveFile>) -> Result<RunSummary> {
        tracing::info!(
            archives = archives.len(),
            workers = self.workers,
            dry_run = self.writer.is_none(),
            "Dispatching archives"
        );
        self.ctx.emit(Event::RunStarted {
            archives: archives.len(),
        });

        let mut summary = RunSummary::default();
        let mut fatal: Option<Error> = None;

        if self.workers == 1 {
            for archive in archives {
                if self.ctx.cancel.is_cancelled() {
                    break;
                }
                let result = process_archive(
                    self.ctx.clone(),
                    Arc::clone(&self.index),
                    self.writer.clone(),
                    archive,
                )
                .await;
                if let Err(e) = tally(&mut summary, result) {
                    fatal = Some(e);
                    break;
                }
            }
        } else {
            let cancel = self.ctx.cancel.clone();
            let mut results = futures::stream::iter(archives)
                .filter(move |_| futures::future::ready(!cancel.is_cancelled()))
                .map(|archive| {
                    let handle = tokio::spawn(process_archive(
                        self.ctx.clone(),
                        Arc::clone(&self.index),
                        self.writer.clone(),
                        archive.clone(),
                    ));
                    async move { (archive, handle.await) }
                })
                .buffer_unordered(self.workers);

            while let Some((archive, joined)) = results.next().await {
                let result = match joined {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::error!(
                            archive = %archive,
                            error = %e,
                            "Archive task died, abandoning archive"
                        );
                        // The attempt count dies with the task
                        self.ctx.emit(Event::ArchiveAbandoned {
                            archive,
                            attempts: 0,
                            error: e.to_string(),
                        });
                        Ok(ArchiveReport::Abandoned)
                    }
                };
                if let Err(e) = tally(&mut summary, result) {
                    if fatal.is_none() {
                        tracing::error!(error = %e, "Stopping run");
                        self.ctx.cancel.cancel();
                        fatal = Some(e);
                    }
                }
            }
        }

        tracing::info!(
            attempted = summary.archives_attempted,
            succeeded = summary.archives_succeeded,
            abandoned = summary.archives_abandoned,
            documents = summary.total_documents(),
            "Run finished"
        );

        if let Some(e) = fatal {
            return Err(e);
        }
        if self.ctx.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(summary)
    }
}

/// Fold one archive result into the summary, passing run-fatal errors through
fn tally(summary: &mut RunSummary, result: Result<ArchiveReport>) -> Result<()> {
    let report = match result {
        Ok(report) => report,
        Err(e) if e.is_run_fatal() => return Err(e),
        Err(e) => {
            tracing::error!(error = %e, "Archive failed outside its attempts, abandoning it");
            ArchiveReport::Abandoned
        }
    };
    summary.archives_attempted += 1;
    match report {
        ArchiveReport::Committed { written } => {
            summary.archives_succeeded += 1;
            for (lang, count) in written {
                *summary.documents_written.entry(lang).or_default() += count;
            }
        }
        ArchiveReport::Abandoned => summary.archives_abandoned += 1,
        ArchiveReport::Cancelled => {}
    }
    Ok(())
}

/// Run one archive to a terminal state and commit its documents on success.
pub async fn process_archive(
    ctx: TaskContext,
    index: Arc<CaptureIndex>,
    writer: Option<OutputWriter>,
    archive: ArchiveFile,
) -> Result<ArchiveReport> {
    let Some(wanted) = index.wanted(&archive) else {
        return Err(Error::Other(format!("{archive} is not in the capture index")));
    };

    ctx.emit(Event::ArchiveStarted {
        archive: archive.clone(),
        wanted: wanted.len(),
    });

    match run_archive(&ctx, &archive, wanted).await {
        ArchiveOutcome::Succeeded {
            batches,
            found,
            attempts,
        } => {
            let mut written = BTreeMap::new();
            if let Some(writer) = &writer {
                for (lang, docs) in batches {
                    let count = writer.append(&lang, docs).await?;
                    written.insert(lang, count);
                }
            }
            tracing::info!("done-cc-file:{}", archive);
            ctx.emit(Event::ArchiveCompleted {
                archive,
                found,
                attempts,
            });
            Ok(ArchiveReport::Committed { written })
        }
        ArchiveOutcome::Abandoned { attempts, error } => {
            ctx.emit(Event::ArchiveAbandoned {
                archive,
                attempts,
                error: error.to_string(),
            });
            Ok(ArchiveReport::Abandoned)
        }
        ArchiveOutcome::Cancelled { .. } => Ok(ArchiveReport::Cancelled),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
