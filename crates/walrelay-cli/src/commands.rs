use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use walrelay_filter::{FamilyFilter, FilterChain, TableFilter};
use walrelay_source::{
    AtomicMetrics, Batch, GroupReader, LogQueue, MetricsSink, MetricsSnapshot, QuotaController,
    SourceConfig,
};
use walrelay_types::TableName;

use crate::cli::{Cli, Command, OutputFormat, ReplayArgs, TailArgs};

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Tail(args) => cmd_tail(args, config, cli.format).await,
        Command::Replay(args) => cmd_replay(args, config, cli.format).await,
    }
}

/// TOML file shape: a single `[source]` table.
#[derive(Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    source: SourceConfig,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SourceConfig> {
    let Some(path) = path else {
        return Ok(SourceConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let parsed: FileConfig =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    Ok(parsed.source)
}

/// The `.wal` files of a group directory, in name order.
fn wal_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "wal"))
        .collect();
    files.sort();
    Ok(files)
}

fn build_filters(families: &[String], tables: &[String]) -> FilterChain {
    let mut chain = FilterChain::new();
    if !tables.is_empty() {
        chain.push(Box::new(TableFilter::new(
            tables.iter().map(|t| TableName::new(t.clone())),
        )));
    }
    if !families.is_empty() {
        chain.push(Box::new(FamilyFilter::new(
            families.iter().map(|f| Bytes::from(f.clone().into_bytes())),
        )));
    }
    chain
}

fn group_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "group".to_owned())
}

async fn cmd_replay(
    args: ReplayArgs,
    mut config: SourceConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let files = wal_files(&args.dir)?;
    anyhow::ensure!(!files.is_empty(), "no .wal files in {}", args.dir.display());
    if args.autorecovery {
        config.eof_autorecovery = true;
    }

    let metrics = Arc::new(AtomicMetrics::new());
    let quota = Arc::new(QuotaController::new(config.quota_bytes));
    let queue = Arc::new(LogQueue::with_paths(
        Arc::clone(&metrics) as Arc<dyn MetricsSink>,
        files,
    ));

    let reader = GroupReader::new(
        group_name(&args.dir),
        queue,
        Arc::clone(&quota),
        Arc::clone(&metrics) as Arc<dyn MetricsSink>,
        config,
    )
    .recovered(true)
    .with_filters(build_filters(&args.families, &args.tables));

    let (handle, mut rx) = reader.spawn();

    let mut batches = 0u64;
    let mut entries = 0u64;
    while let Some(batch) = rx.recv().await {
        batches += 1;
        entries += batch.entry_count() as u64;
        print_batch(batches, &batch, &format)?;
        let done = !batch.more_entries();
        // Stand-in for the shipper: transmit, then return the bytes.
        quota.release(batch.quota_size());
        if done {
            break;
        }
    }

    handle.join().await?;
    print_summary(batches, entries, &metrics.snapshot(), &format)?;
    Ok(())
}

async fn cmd_tail(
    args: TailArgs,
    config: SourceConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let files = wal_files(&args.dir)?;
    let metrics = Arc::new(AtomicMetrics::new());
    let quota = Arc::new(QuotaController::new(config.quota_bytes));
    let queue = Arc::new(LogQueue::with_paths(
        Arc::clone(&metrics) as Arc<dyn MetricsSink>,
        files.iter().cloned(),
    ));

    let reader = GroupReader::new(
        group_name(&args.dir),
        Arc::clone(&queue),
        Arc::clone(&quota),
        Arc::clone(&metrics) as Arc<dyn MetricsSink>,
        config,
    )
    .with_filters(build_filters(&args.families, &args.tables));

    let (handle, mut rx) = reader.spawn();

    // Stand-in for the store's roll callbacks: poll the directory and
    // enqueue files as they appear.
    let poller = {
        let queue = Arc::clone(&queue);
        let dir = args.dir.clone();
        let mut known: HashSet<PathBuf> = files.into_iter().collect();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;
                let Ok(found) = wal_files(&dir) else { continue };
                for path in found {
                    if known.insert(path.clone()) {
                        debug!(path = %path.display(), "new wal discovered");
                        queue.push(path);
                    }
                }
            }
        })
    };

    println!(
        "Tailing {} — {} to stop",
        args.dir.display().to_string().bold(),
        "ctrl-c".yellow()
    );

    let mut batches = 0u64;
    let mut entries = 0u64;
    loop {
        tokio::select! {
            maybe = rx.recv() => {
                let Some(batch) = maybe else { break };
                batches += 1;
                entries += batch.entry_count() as u64;
                print_batch(batches, &batch, &format)?;
                quota.release(batch.quota_size());
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    poller.abort();
    handle.stop();
    handle.join().await?;
    print_summary(batches, entries, &metrics.snapshot(), &format)?;
    Ok(())
}

#[derive(Serialize)]
struct BatchSummary {
    batch: u64,
    entries: usize,
    row_keys: u64,
    bulk_load_files: u64,
    heap_size: u64,
    end_path: PathBuf,
    end_offset: u64,
    more_entries: bool,
}

fn print_batch(index: u64, batch: &Batch, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => {
            println!(
                "{} batch {}: {} entries, {} rows, {} bulk-load files, {} B, ends {}",
                "✓".green(),
                index,
                batch.entry_count().to_string().bold(),
                batch.row_keys(),
                batch.bulk_load_files(),
                batch.heap_size(),
                batch.end_position().to_string().cyan(),
            );
        }
        OutputFormat::Json => {
            let summary = BatchSummary {
                batch: index,
                entries: batch.entry_count(),
                row_keys: batch.row_keys(),
                bulk_load_files: batch.bulk_load_files(),
                heap_size: batch.heap_size(),
                end_path: batch.end_position().path.clone(),
                end_offset: batch.end_position().offset,
                more_entries: batch.more_entries(),
            };
            println!("{}", serde_json::to_string(&summary)?);
        }
    }
    Ok(())
}

fn print_summary(
    batches: u64,
    entries: u64,
    snapshot: &MetricsSnapshot,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => {
            println!(
                "{} {} batches, {} entries shipped ({} read, {} filtered, {} bytes)",
                "done:".green().bold(),
                batches,
                entries,
                snapshot.log_edits_read,
                snapshot.log_edits_filtered,
                snapshot.log_read_bytes,
            );
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(snapshot)?);
        }
    }
    Ok(())
}
