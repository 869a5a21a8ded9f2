//! Capture index: which records to pull from which archive, for which languages.
//!
//! - [`manifest`] - Streaming manifest reader (plain or gzipped JSON lines)
//! - [`resume`] - Ids already persisted by earlier runs
//!
//! The index is built once per run and then only read. Archives are kept in a
//! `BTreeMap` so every instance of a sharded run iterates them in the same order.

mod manifest;
mod resume;

pub use manifest::ManifestReader;
pub use resume::{ResumeState, read_downloaded_ids, repair_partial_tail};

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::types::{ArchiveFile, ExpectedHash, Language, ManifestEntry, WantedIds};

/// Mapping archive → record id → language → expected checksum
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureIndex {
    archives: BTreeMap<ArchiveFile, WantedIds>,
}

impl CaptureIndex {
    /// Empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one wanted (record, language) pair.
    ///
    /// A later entry for the same pair replaces the expected hash of an earlier one.
    pub fn insert(&mut self, lang: &Language, entry: ManifestEntry) {
        let hash: ExpectedHash = entry.md5;
        self.archives
            .entry(entry.cc_file)
            .or_default()
            .entry(entry.id)
            .or_default()
            .insert(lang.clone(), hash);
    }

    /// Archives in stable (sorted) order with their wanted records
    pub fn archives(&self) -> impl Iterator<Item = (&ArchiveFile, &WantedIds)> {
        self.archives.iter()
    }

    /// Wanted records for one archive
    pub fn wanted(&self, archive: &ArchiveFile) -> Option<&WantedIds> {
        self.archives.get(archive)
    }

    /// Number of archives to visit
    pub fn archive_count(&self) -> usize {
        self.archives.len()
    }

    /// Number of distinct (archive, record) pairs to find
    pub fn document_count(&self) -> usize {
        self.archives.values().map(|ids| ids.len()).sum()
    }

    /// Whether there is nothing to capture
    pub fn is_empty(&self) -> bool {
        self.archives.is_empty()
    }
}

/// Build the capture index from every language's manifests, skipping ids that
/// `resume` already holds for that language.
///
/// Fails with a configuration error when no language has manifests or when
/// nothing is left to capture.
pub async fn build_capture_index(
    manifests: &BTreeMap<Language, Vec<PathBuf>>,
    resume: &ResumeState,
) -> Result<CaptureIndex> {
    if manifests.values().all(|files| files.is_empty()) {
        return Err(Error::config("no languages to process", "manifests"));
    }

    tracing::info!("building dictionaries of document to capture");

    let mut index = CaptureIndex::new();
    for (lang, files) in manifests {
        let mut skipped = 0usize;
        let mut added = 0usize;
        for path in files {
            let mut reader = ManifestReader::open(path).await?;
            while let Some(entry) = reader.next_entry().await? {
                if resume.contains(lang, &entry.id) {
                    skipped += 1;
                    continue;
                }
                index.insert(lang, entry);
                added += 1;
            }
            tracing::debug!(
                language = %lang,
                manifest = %reader.path().display(),
                "Read manifest"
            );
        }
        tracing::info!(
            language = %lang,
            outstanding = added,
            already_downloaded = skipped,
            "Built capture entries"
        );
    }

    tracing::info!(
        "Looking for {} documents in {} cc_files",
        index.document_count(),
        index.archive_count()
    );

    if index.is_empty() {
        return Err(Error::config(
            "no documents need to be captured",
            "manifests",
        ));
    }

    Ok(index)
}
