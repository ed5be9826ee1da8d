//! `chainreader run` — ingest marker lines, index blocks, emit summaries.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use chainreader_core::config::{parse_args, parse_env_list, IndexConfig, StoreBackend};
use chainreader_core::shutdown::listen_for_signals;
use chainreader_core::{
    line_channel, BlockAssembler, ConsoleReader, LineParser, LineSender, ProtoBlockEncoder,
    ReaderConfig, ReaderMode, Shutdown, ShutdownHandle, SinkRegistry,
};
use chainreader_index::indexers_from_config;
use chainreader_source::{read_stdin, FileTailer, NodeRunner};

use crate::emitter::SummaryEmitter;
use crate::logging::init_tracing;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// JSON config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Line source: stdin | node | logs
    #[arg(long)]
    mode: Option<ReaderMode>,

    /// Marker prefix (default: "DMLOG ")
    #[arg(long)]
    line_prefix: Option<String>,

    /// First block of the chain; its parent id is cleared
    #[arg(long)]
    first_streamable_block: Option<u64>,

    /// Node binary path or name on PATH
    #[arg(long)]
    node_path: Option<String>,

    /// Node arguments, whitespace separated
    #[arg(long, allow_hyphen_values = true)]
    node_args: Option<String>,

    /// Extra node environment, KEY=VALUE,KEY=VALUE
    #[arg(long)]
    node_env: Option<String>,

    /// Node working directory
    #[arg(long)]
    node_dir: Option<PathBuf>,

    /// Discard the node's stderr instead of forwarding it
    #[arg(long)]
    no_forward_stderr: bool,

    /// Drop forwarded stderr lines matching this regex
    #[arg(long)]
    logs_filter: Option<String>,

    /// Directory of rotating node log files
    #[arg(long)]
    logs_dir: Option<PathBuf>,

    /// Regex for log file names
    #[arg(long)]
    logs_pattern: Option<String>,

    /// Build indexes into this directory
    #[arg(long)]
    index_dir: Option<PathBuf>,

    /// Index backend: fs | sqlite
    #[arg(long)]
    index_backend: Option<StoreBackend>,

    /// Index kinds to build (eventtype, eventorigin, messagetype, combined)
    #[arg(long, value_delimiter = ',')]
    index_kinds: Vec<String>,

    /// Blocks per bundle
    #[arg(long)]
    bundle_size: Option<u64>,

    /// Resume indexing from the first unindexed block at or after this one
    #[arg(long)]
    start_block: Option<u64>,

    /// Write one JSON block summary per line to stdout
    #[arg(long)]
    emit_blocks: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// JSON structured logs
    #[arg(long)]
    json_logs: bool,
}

impl RunArgs {
    pub fn into_config(self) -> Result<ReaderConfig> {
        let mut config = match &self.config {
            Some(path) => ReaderConfig::load(path)?,
            None => ReaderConfig::default(),
        };

        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(prefix) = self.line_prefix {
            config.line_prefix = prefix;
        }
        if let Some(n) = self.first_streamable_block {
            config.first_streamable_block = n;
        }

        if let Some(path) = self.node_path {
            config.node.path = Some(path);
        }
        if let Some(args) = self.node_args {
            config.node.args = parse_args(&args);
        }
        if let Some(env) = self.node_env {
            config.node.env.extend(parse_env_list(&env)?);
        }
        if let Some(dir) = self.node_dir {
            config.node.dir = Some(dir);
        }
        if self.no_forward_stderr {
            config.node.forward_stderr = false;
        }
        if let Some(filter) = self.logs_filter {
            config.node.logs_filter = Some(filter);
        }

        if let Some(dir) = self.logs_dir {
            config.logs.dir = Some(dir);
        }
        if let Some(pattern) = self.logs_pattern {
            config.logs.pattern = pattern;
        }

        let wants_index = self.index_dir.is_some()
            || self.index_backend.is_some()
            || !self.index_kinds.is_empty()
            || self.bundle_size.is_some()
            || self.start_block.is_some();
        if wants_index {
            let index = config.index.get_or_insert_with(IndexConfig::default);
            if let Some(dir) = self.index_dir {
                index.dir = dir;
            }
            if let Some(backend) = self.index_backend {
                index.backend = backend;
            }
            if !self.index_kinds.is_empty() {
                index.kinds = self.index_kinds;
            }
            if let Some(size) = self.bundle_size {
                index.bundle_size = size;
            }
            if let Some(start) = self.start_block {
                index.start_block = Some(start);
            }
        }

        if let Some(level) = self.log_level {
            config.log.level = level;
        }
        if self.json_logs {
            config.log.json = true;
        }
        Ok(config)
    }
}

pub async fn run(args: RunArgs) -> Result<()> {
    let emit_blocks = args.emit_blocks;
    let config = args.into_config()?;
    init_tracing(&config.log)?;
    config.validate()?;

    info!(mode = %config.mode, prefix = %config.line_prefix.trim_end(), "starting reader");

    let (handle, shutdown) = ShutdownHandle::new();
    let signals = listen_for_signals(handle.clone());

    let mut sinks = SinkRegistry::new();
    if let Some(index) = &config.index {
        let store = chainreader_storage::open_store(index)
            .await
            .with_context(|| format!("opening index store at {}", index.dir.display()))?;
        for indexer in indexers_from_config(store, index, config.first_streamable_block).await? {
            info!(kind = %indexer.kind(), bundle_size = indexer.bundle_size(), "indexer registered");
            sinks.register(Box::new(indexer));
        }
    }
    if emit_blocks {
        sinks.register(Box::new(SummaryEmitter::new(std::io::BufWriter::new(std::io::stdout()))));
    }
    if sinks.is_empty() {
        warn!("no sinks configured; blocks are parsed and dropped");
    }

    let (tx, rx) = line_channel(config.channel_capacity);
    let source = spawn_source(&config, tx, shutdown).await?;

    let mut reader = ConsoleReader::new(
        rx,
        LineParser::with_prefix(config.line_prefix.clone()),
        BlockAssembler::new(Arc::new(ProtoBlockEncoder), config.first_streamable_block),
    );
    let outcome = sinks.run(&mut reader).await;

    // Closing the queue unblocks a source stuck on a full channel.
    drop(reader);
    if outcome.is_err() {
        handle.trigger();
    }
    let source_outcome = source.await.context("source task panicked")?;
    signals.abort();

    match &outcome {
        Ok(stats) => info!(
            blocks = stats.blocks,
            transactions = stats.transactions,
            last_block = ?stats.last_block,
            "reader stopped"
        ),
        Err(e) => error!(error = %e, "pipeline failed"),
    }

    outcome?;
    source_outcome
}

/// Start the producer for `config.mode`. The task ends when its input is
/// exhausted or `shutdown` fires, closing the line queue.
async fn spawn_source(
    config: &ReaderConfig,
    lines: LineSender,
    mut shutdown: Shutdown,
) -> Result<JoinHandle<Result<()>>> {
    let buffer_size = config.line_buffer_size;
    let task = match config.mode {
        ReaderMode::Stdin => tokio::spawn(async move {
            tokio::select! {
                res = read_stdin(lines, buffer_size) => {
                    let count = res?;
                    info!(lines = count, "standard input closed");
                }
                _ = shutdown.cancelled() => info!("stopped reading standard input"),
            }
            anyhow::Ok(())
        }),
        ReaderMode::Node => {
            let runner = NodeRunner::from_config(&config.node, buffer_size)?;
            tokio::spawn(async move {
                match runner.run(lines, shutdown).await {
                    Ok(status) => {
                        info!(%status, "node exited");
                        Ok(())
                    }
                    Err(e) if e.is_graceful() => {
                        info!(error = %e, "node stopped");
                        Ok(())
                    }
                    Err(e) if e.is_cancellation() => {
                        warn!(error = %e, "node did not stop in time");
                        Ok(())
                    }
                    Err(e) => Err(anyhow::Error::from(e)),
                }
            })
        }
        ReaderMode::Logs => {
            let tailer = FileTailer::new(&config.logs).await?;
            tokio::spawn(async move {
                let stats = tailer.run(lines, shutdown).await?;
                info!(
                    files = stats.files_read,
                    lines = stats.lines_sent,
                    read_errors = stats.read_errors,
                    "log tailer stopped"
                );
                anyhow::Ok(())
            })
        }
    };
    Ok(task)
}
