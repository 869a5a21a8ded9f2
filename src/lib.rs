//! # ccfetch
//!
//! Retrieve selected documents from Common Crawl WARC archives.
//!
//! ## Design Philosophy
//!
//! ccfetch is designed to be:
//! - **Resumable** - Output files are the only state; rerunning skips what is already there
//! - **Shardable** - Independent instances split the work deterministically
//! - **Auditable** - Every checksum match and mismatch is logged in a parseable shape
//! - **Event-driven** - Consumers subscribe to progress events, no polling required
//!
//! ## Data flow
//!
//! Manifests list `{id, cc_file, md5?}` per language. They are folded into a
//! [`CaptureIndex`] (archive → record → language → expected checksum), minus
//! ids already present in the output. Each archive is then streamed once per
//! attempt, wanted records are extracted and validated, and successful
//! archives are appended to `<storage>/<lang>/docs.jsonl`.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ccfetch::{Config, Pipeline, ValidationMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config {
//!         storage_dir: "./data".into(),
//!         workers: 8,
//!         validation: ValidationMode::Lenient,
//!         ..Default::default()
//!     };
//!     config
//!         .manifests
//!         .insert("zho".into(), vec!["ids/zho.jsonl.gz".into()]);
//!
//!     let pipeline = Pipeline::new(config)?;
//!
//!     // Subscribe to events
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = ccfetch::run_with_shutdown(&pipeline).await?;
//!     println!("{} documents written", summary.total_documents());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Archive sources and WARC record framing
pub mod archive;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Article extraction and checksum validation
pub mod extract;
/// Capture index construction and resume state
pub mod index;
/// Logging initialisation
pub mod logging;
/// End-to-end run wiring
pub mod pipeline;
/// Terminal progress bars
pub mod progress;
/// Hash-mismatch reports from run logs
pub mod report;
/// Retry classification and backoff
pub mod retry;
/// Archive selection and dispatch
pub mod scheduler;
/// Archive task runner
pub mod task;
/// Core types and events
pub mod types;
/// Concurrent output writer
pub mod writer;

// Re-export commonly used types
pub use archive::{ArchiveSource, HttpArchiveSource, RawRecord, RecordStream};
pub use config::{Config, RetryConfig, RunMode, ShardConfig, ValidationMode};
pub use error::{Error, Result};
pub use extract::{Article, ArticleExtractor, HtmlArticleExtractor};
pub use index::{CaptureIndex, ResumeState, build_capture_index};
pub use pipeline::Pipeline;
pub use types::{
    ArchiveFile, ArchiveState, Document, DocumentId, Event, Language, ManifestEntry, RunSummary,
};

/// Run a pipeline, cancelling it gracefully on a termination signal.
///
/// On a signal the run stops dispatching archives, lets in-flight archives
/// unwind without writing partial results, and returns [`Error::Cancelled`].
///
/// On Unix either SIGTERM or SIGINT cancels the run; a signal that cannot be
/// registered is skipped, and Ctrl+C is the last resort. Elsewhere only Ctrl+C
/// is watched.
///
/// # Example
///
/// ```no_run
/// use ccfetch::{Config, Pipeline, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::from_json_file("ccfetch.json".as_ref())?;
///     let pipeline = Pipeline::new(config)?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(&pipeline).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(pipeline: &Pipeline) -> Result<RunSummary> {
    let cancel = pipeline.cancel_token();
    let watcher = tokio::spawn(async move {
        wait_for_signal().await;
        tracing::warn!("Cancelling run, waiting for in-flight archives to stop");
        cancel.cancel();
    });

    let result = pipeline.run().await;
    watcher.abort();
    result
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{Signal, SignalKind, signal};

    // A signal that could not be registered never fires
    async fn fired(stream: Option<&mut Signal>) {
        match stream {
            Some(stream) => {
                stream.recv().await;
            }
            None => std::future::pending().await,
        }
    }

    let listen = |kind: SignalKind, name: &str| match signal(kind) {
        Ok(stream) => Some(stream),
        Err(e) => {
            tracing::warn!(signal = name, error = %e, "Cannot listen for signal");
            None
        }
    };
    let mut term = listen(SignalKind::terminate(), "SIGTERM");
    let mut int = listen(SignalKind::interrupt(), "SIGINT");

    let name = if term.is_none() && int.is_none() {
        tokio::signal::ctrl_c().await.ok();
        "ctrl-c"
    } else {
        tokio::select! {
            _ = fired(term.as_mut()) => "SIGTERM",
            _ = fired(int.as_mut()) => "SIGINT",
        }
    };
    tracing::info!(signal = name, "Received shutdown signal");
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Cannot listen for Ctrl+C, the run will not be interruptible");
        std::future::pending::<()>().await;
    }
    tracing::info!(signal = "ctrl-c", "Received shutdown signal");
}
