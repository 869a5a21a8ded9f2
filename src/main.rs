//! ccfetch - retrieve selected Common Crawl documents

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use ccfetch::logging::{init_logging, prepare_log_file};
use ccfetch::progress::{ProgressMode, spawn_progress};
use ccfetch::report::{
    DEFAULT_ROW_LIMIT, collect_mismatches, find_run_logs, render_markdown, write_report_jsonl_gz,
};
use ccfetch::{Config, Language, Pipeline, RunMode, ShardConfig, ValidationMode};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "ccfetch")]
#[command(author, version, about = "Retrieve selected documents from Common Crawl archives")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download the documents listed in the manifests
    Run(RunArgs),

    /// Summarize hash mismatches recorded in run logs
    Report(ReportArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// JSON config file; command-line options override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Storage directory for output files and run logs
    #[arg(long)]
    storage: Option<PathBuf>,

    /// Manifest files for Chinese documents
    #[arg(long, num_args = 1..)]
    zho: Vec<PathBuf>,

    /// Manifest files for Russian documents
    #[arg(long, num_args = 1..)]
    rus: Vec<PathBuf>,

    /// Manifest files for Persian documents
    #[arg(long, num_args = 1..)]
    fas: Vec<PathBuf>,

    /// Manifest for any other language, as CODE=PATH (repeatable)
    #[arg(long = "lang-manifest", value_name = "CODE=PATH", value_parser = parse_lang_manifest)]
    lang_manifests: Vec<(String, PathBuf)>,

    /// Number of archives processed concurrently
    #[arg(long)]
    jobs: Option<usize>,

    /// Attempts per archive before it is abandoned
    #[arg(long)]
    retry: Option<u32>,

    /// Fail an archive attempt on checksum mismatch or missing records
    #[arg(long)]
    check_hash: bool,

    /// Delete existing output and start over
    #[arg(long, conflicts_with = "resume")]
    restart: bool,

    /// Keep existing output and skip documents it already holds
    #[arg(long)]
    resume: bool,

    /// Fetch and validate without writing output
    #[arg(long)]
    no_save: bool,

    /// Index of this instance in a sharded run
    #[arg(long, requires = "total_rank")]
    rank: Option<usize>,

    /// Number of instances in a sharded run
    #[arg(long, requires = "rank")]
    total_rank: Option<usize>,

    /// Maximum number of archives the whole run attempts, before sharding
    #[arg(long)]
    limit: Option<usize>,

    /// Base URL archives are fetched from
    #[arg(long, env = "CCFETCH_BASE_URL")]
    cc_base_url: Option<String>,
}

#[derive(Args, Debug)]
struct ReportArgs {
    /// Directory containing download_log*.txt files
    #[arg(long, default_value = "./data")]
    logs: PathBuf,

    /// Maximum table rows printed per language
    #[arg(long, default_value_t = DEFAULT_ROW_LIMIT)]
    rows: usize,

    /// Write every mismatch as gzip-compressed JSON lines to this file
    #[arg(long)]
    output: Option<PathBuf>,

    /// Known document count of a language, as CODE=COUNT (repeatable)
    #[arg(long = "total", value_name = "CODE=COUNT", value_parser = parse_lang_total)]
    totals: Vec<(String, usize)>,
}

fn parse_lang_manifest(raw: &str) -> std::result::Result<(String, PathBuf), String> {
    let (code, path) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected CODE=PATH, got '{raw}'"))?;
    if code.is_empty() || path.is_empty() {
        return Err(format!("expected CODE=PATH, got '{raw}'"));
    }
    Ok((code.to_string(), PathBuf::from(path)))
}

fn parse_lang_total(raw: &str) -> std::result::Result<(String, usize), String> {
    let (code, count) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected CODE=COUNT, got '{raw}'"))?;
    let count = count
        .parse()
        .map_err(|e| format!("invalid count in '{raw}': {e}"))?;
    Ok((code.to_string(), count))
}

impl RunArgs {
    /// Merge the options over the config file (or the defaults)
    fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => Config::default(),
        };

        if let Some(storage) = self.storage {
            config.storage_dir = storage;
        }

        let named = [("zho", self.zho), ("rus", self.rus), ("fas", self.fas)];
        for (code, files) in named {
            if !files.is_empty() {
                config.manifests.entry(Language::from(code)).or_default().extend(files);
            }
        }
        for (code, path) in self.lang_manifests {
            config
                .manifests
                .entry(Language::new(code))
                .or_default()
                .push(path);
        }

        if let Some(jobs) = self.jobs {
            config.workers = jobs;
        }
        if let Some(retry) = self.retry {
            config.retry.max_attempts = retry;
        }
        if self.check_hash {
            config.validation = ValidationMode::Strict;
        }
        if self.restart || self.resume {
            config.run_mode = RunMode::from_flags(self.restart, self.resume)?;
        }
        if self.no_save {
            config.dry_run = true;
        }
        if let (Some(index), Some(count)) = (self.rank, self.total_rank) {
            config.shard = Some(ShardConfig { index, count });
        }
        if self.limit.is_some() {
            config.limit = self.limit;
        }
        if let Some(base_url) = self.cc_base_url {
            config.base_url = base_url;
        }

        config.validate()?;
        Ok(config)
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let config = args.into_config()?;

    let log_path = config.log_path();
    prepare_log_file(&log_path, config.run_mode)?;
    let _guard = init_logging(Some(&log_path))?;

    info!(
        storage = %config.storage_dir.display(),
        languages = ?config.languages().collect::<Vec<_>>(),
        workers = config.workers,
        max_attempts = config.retry.max_attempts,
        strict = config.validation.is_strict(),
        mode = ?config.run_mode,
        base_url = %config.base_url,
        "Starting run"
    );

    let pipeline = Pipeline::new(config)?;
    let mode = ProgressMode::for_config(pipeline.config());
    let progress = spawn_progress(pipeline.subscribe(), mode);

    let result = ccfetch::run_with_shutdown(&pipeline).await;
    // Dropping the pipeline closes the event channel and ends the display
    drop(pipeline);
    if let Some(progress) = progress
        && let Err(e) = progress.await
    {
        warn!(error = %e, "Progress display failed");
    }
    let summary = result?;

    info!(
        attempted = summary.archives_attempted,
        succeeded = summary.archives_succeeded,
        abandoned = summary.archives_abandoned,
        documents = summary.total_documents(),
        "Run complete"
    );
    for (lang, count) in &summary.documents_written {
        info!(language = %lang, documents = count, "Documents written");
    }
    Ok(())
}

async fn report(args: ReportArgs) -> Result<()> {
    let _guard = init_logging(None)?;

    let logs = find_run_logs(&args.logs)
        .await
        .with_context(|| format!("Failed to list run logs in {}", args.logs.display()))?;
    info!(logs = logs.len(), dir = %args.logs.display(), "Scanning run logs");

    let mismatches = collect_mismatches(&logs).await?;
    let totals: BTreeMap<Language, usize> = args
        .totals
        .into_iter()
        .map(|(code, count)| (Language::new(code), count))
        .collect();

    println!("{}", render_markdown(&mismatches, &totals, args.rows));

    if let Some(output) = args.output {
        let written = write_report_jsonl_gz(&mismatches, &output).await?;
        info!(path = %output.display(), entries = written, "Wrote mismatch report");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Report(args) => report(args).await,
    }
}
