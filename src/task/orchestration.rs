//! Archive task orchestration: the attempt loop and its state machine.

use crate::error::Error;
use crate::retry::{Backoff, IsRetryable};
use crate::types::{ArchiveFile, ArchiveState, Event, WantedIds};

use super::attempt::{Batches, run_attempt};
use super::context::TaskContext;

/// Final result of processing one archive
#[derive(Debug)]
pub enum ArchiveOutcome {
    /// An attempt read the archive and validated everything it found
    Succeeded {
        /// Documents to commit, per language
        batches: Batches,
        /// Distinct wanted records found
        found: usize,
        /// Attempts used
        attempts: u32,
    },
    /// Attempts ran out or the failure was permanent
    Abandoned {
        /// Attempts used
        attempts: u32,
        /// The error that ended the last attempt
        error: Error,
    },
    /// The run was cancelled while this archive was in flight
    Cancelled {
        /// Attempts started
        attempts: u32,
    },
}

impl ArchiveOutcome {
    /// Terminal state this outcome corresponds to
    pub fn state(&self) -> ArchiveState {
        match self {
            ArchiveOutcome::Succeeded { .. } => ArchiveState::Succeeded,
            ArchiveOutcome::Abandoned { .. } => ArchiveState::Abandoned,
            ArchiveOutcome::Cancelled { .. } => ArchiveState::Cancelled,
        }
    }
}

/// State to move to after attempt `attempt` failed with `error`.
pub fn after_failure(attempt: u32, max_attempts: u32, error: &Error) -> ArchiveState {
    match error {
        Error::Cancelled => ArchiveState::Cancelled,
        e if !e.is_retryable() || attempt >= max_attempts => ArchiveState::Abandoned,
        _ => ArchiveState::Attempting(attempt + 1),
    }
}

/// Process one archive against its wanted ids, retrying whole-archive attempts.
///
/// Each attempt streams the archive from the start; nothing collected by a
/// failed attempt is kept. Failures are logged and never escalate: an
/// abandoned archive is reported through the outcome and the run carries on.
pub async fn run_archive(
    ctx: &TaskContext,
    archive: &ArchiveFile,
    wanted: &WantedIds,
) -> ArchiveOutcome {
    let max_attempts = ctx.retry.max_attempts;
    let mut backoff = Backoff::new(&ctx.retry);
    let mut attempt = 1;

    loop {
        tracing::debug!(
            archive = %archive,
            state = ?ArchiveState::Attempting(attempt),
            max_attempts,
            "Starting archive attempt"
        );

        let error = match run_attempt(ctx, archive, wanted).await {
            Ok(output) => {
                return ArchiveOutcome::Succeeded {
                    batches: output.batches,
                    found: output.found,
                    attempts: attempt,
                };
            }
            Err(e) => e,
        };

        match after_failure(attempt, max_attempts, &error) {
            ArchiveState::Attempting(next) => {
                tracing::warn!(
                    archive = %archive,
                    attempt,
                    max_attempts,
                    error = %error,
                    "Archive attempt failed, retrying"
                );
                ctx.emit(Event::ArchiveRetrying {
                    archive: archive.clone(),
                    attempt,
                    error: error.to_string(),
                });

                let delay = backoff.next_delay();
                if !delay.is_zero() {
                    tokio::select! {
                        _ = ctx.cancel.cancelled() => {
                            return ArchiveOutcome::Cancelled { attempts: attempt };
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                attempt = next;
            }
            ArchiveState::Cancelled => {
                tracing::info!(archive = %archive, attempt, "Archive cancelled");
                return ArchiveOutcome::Cancelled { attempts: attempt };
            }
            _ => {
                tracing::error!(
                    archive = %archive,
                    attempts = attempt,
                    retryable = error.is_retryable(),
                    error = %error,
                    "Giving up on archive"
                );
                return ArchiveOutcome::Abandoned {
                    attempts: attempt,
                    error,
                };
            }
        }
    }
}
