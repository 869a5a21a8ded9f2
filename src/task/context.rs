//! Task context: the collaborators every archive task shares.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::archive::ArchiveSource;
use crate::config::{RetryConfig, ValidationMode};
use crate::extract::ArticleExtractor;
use crate::types::Event;

/// Shared context for archive tasks, cloned into every worker.
#[derive(Clone)]
pub struct TaskContext {
    /// Where archives are streamed from
    pub source: Arc<dyn ArchiveSource>,
    /// HTML to article conversion
    pub extractor: Arc<dyn ArticleExtractor>,
    /// Attempt budget and backoff
    pub retry: RetryConfig,
    /// Checksum strictness
    pub validation: ValidationMode,
    /// Progress event channel
    pub event_tx: broadcast::Sender<Event>,
    /// Run-wide cancellation
    pub cancel: CancellationToken,
}

impl TaskContext {
    /// Publish a progress event; having no subscribers is fine
    pub(crate) fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
