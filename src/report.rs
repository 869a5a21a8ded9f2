//! Hash-mismatch report mined from run logs.
//!
//! Lenient runs keep documents whose content no longer matches the manifest
//! checksum and log a `[hash-mismatch]` line for each. This module collects
//! those lines from every run log in a storage directory and renders them as
//! a Markdown summary and an optional gzip-compressed JSON lines file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_compression::tokio::write::GzipEncoder;
use comfy_table::{Table, presets::ASCII_MARKDOWN};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::error::{Error, Result};
use crate::types::{DocumentId, Language};

/// Marker of a mismatch line in the run log
const MISMATCH_MARKER: &str = "[hash-mismatch]";

/// Text preceding the record id in match and mismatch lines
const RECORD_ID_PREFIX: &str = "record-id: ";

/// Default cap on table rows printed per language
pub const DEFAULT_ROW_LIMIT: usize = 200;

/// One logged checksum mismatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MismatchEntry {
    /// Language whose manifest expected the checksum
    pub lang: Language,
    /// Record id
    pub id: DocumentId,
    /// Checksum from the manifest
    pub expect: String,
    /// Checksum of the retrieved content
    pub got: String,
}

/// Mismatches grouped by language
pub type MismatchReport = BTreeMap<Language, Vec<MismatchEntry>>;

/// Parse a `[hash-mismatch]` log line.
///
/// The line shape is `... [hash-mismatch] record-id: <id>, <lang>, expecting <expected> but got <got>`;
/// anything before the marker (timestamp, level) is ignored. Other lines yield `None`.
pub fn parse_mismatch_line(line: &str) -> Option<MismatchEntry> {
    let (_, tail) = line.split_once(MISMATCH_MARKER)?;
    let (_, fields) = tail.split_once(RECORD_ID_PREFIX)?;
    let tokens: Vec<&str> = fields.split_whitespace().collect();
    if tokens.len() < 7 || tokens[2] != "expecting" || tokens[5] != "got" {
        return None;
    }
    Some(MismatchEntry {
        lang: Language::new(tokens[1].trim_end_matches(',')),
        id: DocumentId::new(tokens[0].trim_end_matches(',')),
        expect: tokens[3].to_string(),
        got: tokens[6].to_string(),
    })
}

/// Run logs in `dir` (`download_log.txt` and sharded `download_log.<n>.txt`), sorted by name.
pub async fn find_run_logs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut logs = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with("download_log") && name.ends_with(".txt") {
            logs.push(entry.path());
        }
    }
    logs.sort();
    Ok(logs)
}

/// Collect every mismatch from the given run logs, grouped by language.
pub async fn collect_mismatches(logs: &[PathBuf]) -> Result<MismatchReport> {
    let mut report = MismatchReport::new();
    for path in logs {
        let file = tokio::fs::File::open(path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut found = 0usize;
        while let Some(line) = lines.next_line().await? {
            if let Some(entry) = parse_mismatch_line(&line) {
                report.entry(entry.lang.clone()).or_default().push(entry);
                found += 1;
            }
        }
        tracing::debug!(log = %path.display(), mismatches = found, "Scanned run log");
    }
    Ok(report)
}

/// Render the report as Markdown, at most `row_limit` table rows per language.
///
/// When `totals` knows a language's document count, the heading also shows
/// the mismatch rate.
pub fn render_markdown(
    report: &MismatchReport,
    totals: &BTreeMap<Language, usize>,
    row_limit: usize,
) -> String {
    let mut out = String::from("# Mismatch Hashes\n");
    if report.is_empty() {
        out.push_str("\nNo mismatches found.\n");
        return out;
    }

    for (lang, entries) in report {
        let heading = match totals.get(lang) {
            Some(&total) if total > 0 => format!(
                "{} ({}/{} -- {:.4}%)",
                lang,
                entries.len(),
                total,
                entries.len() as f64 / total as f64 * 100.0
            ),
            _ => format!("{} ({})", lang, entries.len()),
        };
        out.push_str(&format!("\n### {heading}\n\n"));
        if entries.len() > row_limit {
            out.push_str(&format!(
                "More than {row_limit} mismatches found -- see artifacts for complete list.\n\n"
            ));
        }

        let mut table = Table::new();
        table
            .load_preset(ASCII_MARKDOWN)
            .set_header(vec!["id", "expect", "got"]);
        for entry in entries.iter().take(row_limit) {
            table.add_row(vec![entry.id.as_str(), entry.expect.as_str(), entry.got.as_str()]);
        }
        out.push_str(&format!("{table}\n"));
    }
    out
}

/// Write every entry as one JSON object per line into a gzip file.
pub async fn write_report_jsonl_gz(report: &MismatchReport, path: &Path) -> Result<usize> {
    let output_error = |source| Error::Output {
        path: path.to_path_buf(),
        source,
    };
    let file = tokio::fs::File::create(path).await.map_err(output_error)?;
    let mut encoder = GzipEncoder::new(file);

    let mut written = 0;
    for entry in report.values().flatten() {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        encoder.write_all(&line).await.map_err(output_error)?;
        written += 1;
    }
    encoder.shutdown().await.map_err(output_error)?;
    Ok(written)
}
