//! ChainReader CLI — ingest node marker output and query block indexes.
//!
//! # Commands
//! ```text
//! chainreader run            --mode stdin|node|logs [--index-dir <dir>] [--emit-blocks]
//! chainreader filter         --message-type <url> [--event-type <t>] [--event-origin <o>] [--all]
//! chainreader next-unindexed --kind <kind> --start <block>
//! chainreader info
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

use chainreader_core::config::LogConfig;

mod cmd_filter;
mod cmd_run;
mod emitter;
mod logging;

#[derive(Parser)]
#[command(
    name = "chainreader",
    about = "Cosmos node instrumentation reader — ChainReader CLI",
    long_about = "
ChainReader CLI: turn a node's DMLOG marker output into finalized blocks,
build roaring-bitmap indexes over them, and query those indexes.

ENVIRONMENT VARIABLES:
  RUST_LOG    Log filter directives; overrides --log-level
",
    version
)]
struct Cli {
    /// Enable debug logging for query commands
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read marker lines from stdin, a node process, or log files
    Run(cmd_run::RunArgs),

    /// List blocks matching a filter from a built index
    Filter(cmd_filter::FilterArgs),

    /// Print the first block not covered by an index
    #[command(name = "next-unindexed")]
    NextUnindexed(cmd_filter::NextUnindexedArgs),

    /// Show ChainReader build and capability info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let query_logs = LogConfig {
        level: if cli.verbose { "debug" } else { "warn" }.into(),
        ..Default::default()
    };

    match cli.command {
        Commands::Run(args) => cmd_run::run(args).await,
        Commands::Filter(args) => {
            logging::init_tracing(&query_logs)?;
            cmd_filter::run_filter(args).await
        }
        Commands::NextUnindexed(args) => {
            logging::init_tracing(&query_logs)?;
            cmd_filter::run_next_unindexed(args).await
        }
        Commands::Info => cmd_info(),
    }
}

fn cmd_info() -> Result<()> {
    println!("ChainReader v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Sources:");
    println!("  ✓ stdin      piped marker output");
    println!("  ✓ node       supervised subprocess (SIGINT, then SIGKILL after timeout)");
    println!("  ✓ logs       rotating log files, resumable via file_list.txt");
    println!();
    println!("Markers:      BEGIN, BLOCK, TX, VSET_UPDATE, END (prefix \"DMLOG \")");
    println!("Indexes:      eventtype, eventorigin, messagetype, combined (roaring)");
    println!(
        "Backends:     fs{}",
        if cfg!(feature = "sqlite") { ", sqlite" } else { "" }
    );
    Ok(())
}
