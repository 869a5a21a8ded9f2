//! Terminal progress bars driven by run events.
//!
//! An overall "All files" bar counts finished archives. With a single worker
//! each archive also gets a bar counting its wanted records. Sharded runs show
//! nothing, since many instances usually share one terminal or none.

use std::collections::HashMap;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::types::{ArchiveFile, Event};

const BAR_TEMPLATE: &str =
    "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})";

/// Which bars a run shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    /// No bars
    Off,
    /// Only the overall archive bar
    Overall,
    /// Overall bar plus one bar per archive in flight
    PerArchive,
}

impl ProgressMode {
    /// Bars suited to a run with this configuration
    pub fn for_config(config: &Config) -> Self {
        match (config.shard, config.workers) {
            (Some(_), _) => ProgressMode::Off,
            (None, 1) => ProgressMode::PerArchive,
            (None, _) => ProgressMode::Overall,
        }
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

/// Bar state for one run
pub struct RunProgress {
    multi: MultiProgress,
    per_archive: bool,
    overall: Option<ProgressBar>,
    archives: HashMap<ArchiveFile, ProgressBar>,
}

impl RunProgress {
    /// Bars drawn to stderr
    pub fn new(per_archive: bool) -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr(), per_archive)
    }

    /// Bars drawn to `target`
    pub fn with_draw_target(target: ProgressDrawTarget, per_archive: bool) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(target),
            per_archive,
            overall: None,
            archives: HashMap::new(),
        }
    }

    /// Update the bars for one event
    pub fn handle(&mut self, event: &Event) {
        match event {
            Event::RunStarted { archives } => {
                let bar = self.multi.add(ProgressBar::new(*archives as u64));
                bar.set_style(bar_style());
                bar.set_message("All files");
                self.overall = Some(bar);
            }
            Event::ArchiveStarted { archive, wanted } if self.per_archive => {
                let bar = self.multi.add(ProgressBar::new(*wanted as u64));
                bar.set_style(bar_style());
                bar.set_message(archive.to_string());
                self.archives.insert(archive.clone(), bar);
            }
            Event::RecordFound { archive, found, .. } => {
                if let Some(bar) = self.archives.get(archive) {
                    bar.set_position(*found as u64);
                }
            }
            Event::ArchiveRetrying {
                archive, attempt, ..
            } => {
                if let Some(bar) = self.archives.get(archive) {
                    bar.reset();
                    bar.set_message(format!("{archive} (attempt {attempt} failed)"));
                }
            }
            Event::ArchiveCompleted { archive, .. } | Event::ArchiveAbandoned { archive, .. } => {
                if let Some(bar) = self.archives.remove(archive) {
                    bar.finish_and_clear();
                    self.multi.remove(&bar);
                }
                if let Some(overall) = &self.overall {
                    overall.inc(1);
                }
            }
            Event::ArchiveStarted { .. } => {}
        }
    }

    /// Close every bar that is still open
    pub fn finish(&mut self) {
        for (_, bar) in self.archives.drain() {
            bar.finish_and_clear();
        }
        if let Some(overall) = &self.overall {
            overall.finish();
        }
    }
}

/// Draw bars for `mode` from `events` until the channel closes.
///
/// Returns `None` when the mode shows nothing.
pub fn spawn_progress(
    mut events: broadcast::Receiver<Event>,
    mode: ProgressMode,
) -> Option<JoinHandle<()>> {
    if mode == ProgressMode::Off {
        return None;
    }
    let mut progress = RunProgress::new(mode == ProgressMode::PerArchive);
    Some(tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => progress.handle(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Progress display fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
        progress.finish();
    }))
}
