//! A single streaming pass over one archive.

use std::collections::{BTreeMap, HashSet};

use futures::StreamExt;

use super::context::TaskContext;
use crate::error::{Error, Result};
use crate::extract::{check_hash, extract_document, hash_document};
use crate::types::{ArchiveFile, Document, DocumentId, Event, Language, WantedIds};

/// Documents collected for each language during an attempt
pub type Batches = BTreeMap<Language, Vec<Document>>;

/// What one successful pass over an archive produced
#[derive(Debug, Default)]
pub struct AttemptOutput {
    /// Documents per language, in archive record order
    pub batches: Batches,
    /// Distinct wanted records found
    pub found: usize,
}

/// Stream `archive` once and collect every wanted record.
///
/// Reading stops as soon as all wanted ids are found. Records that nobody
/// wants are never handed to the extractor. Any error discards what this
/// attempt collected; the caller decides whether to try again.
pub async fn run_attempt(
    ctx: &TaskContext,
    archive: &ArchiveFile,
    wanted: &WantedIds,
) -> Result<AttemptOutput> {
    let mut stream = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return Err(Error::Cancelled),
        opened = ctx.source.open(archive) => opened?,
    };

    let mut found: HashSet<DocumentId> = HashSet::with_capacity(wanted.len());
    let mut batches = Batches::new();

    while found.len() < wanted.len() {
        let next = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(Error::Cancelled),
            next = stream.next() => next,
        };
        let Some(record) = next else {
            break;
        };
        let record = record?;

        let Some(languages) = wanted.get(&record.id) else {
            continue;
        };
        // Archives occasionally carry the same record twice
        if found.contains(&record.id) {
            continue;
        }

        let doc = extract_document(ctx.extractor.as_ref(), archive, &record)?;
        let got = hash_document(&doc);
        for (lang, expected) in languages {
            check_hash(&doc, lang, expected.as_deref(), &got, ctx.validation)?;
            batches.entry(lang.clone()).or_default().push(doc.clone());
        }
        found.insert(record.id);
        ctx.emit(Event::RecordFound {
            archive: archive.clone(),
            found: found.len(),
            wanted: wanted.len(),
        });

        if found.len() == wanted.len() {
            tracing::info!("Found all needed docs in {}, early stopping", archive);
        }
    }

    if found.len() < wanted.len() {
        if ctx.validation.is_strict() {
            return Err(Error::WantedIdsNotFound {
                archive: archive.clone(),
                found: found.len(),
                wanted: wanted.len(),
            });
        }
        tracing::debug!(
            archive = %archive,
            found = found.len(),
            wanted = wanted.len(),
            "Archive ended before all wanted records were seen"
        );
    }

    Ok(AttemptOutput {
        batches,
        found: found.len(),
    })
}
