//! `chainreader filter` and `chainreader next-unindexed` — query built indexes.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Args;

use chainreader_core::config::{IndexConfig, StoreBackend, DEFAULT_LOOKUP_SIZES};
use chainreader_core::IndexStore;
use chainreader_index::{
    find_next_unindexed, CombinePolicy, EventOrigin, FilterEvaluator, FilterSpec, IndexError,
    IndexKind,
};

#[derive(Debug, Args)]
pub struct StoreArgs {
    /// Index directory
    #[arg(long, default_value = "./index")]
    index_dir: PathBuf,

    /// Index backend: fs | sqlite
    #[arg(long, default_value = "fs")]
    index_backend: StoreBackend,

    /// Bundle sizes to look for, largest first
    #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_LOOKUP_SIZES)]
    lookup_sizes: Vec<u64>,
}

impl StoreArgs {
    async fn open(&self) -> Result<Arc<dyn IndexStore>> {
        let config = IndexConfig {
            dir: self.index_dir.clone(),
            backend: self.index_backend,
            ..Default::default()
        };
        if !config.dir.is_dir() {
            bail!("index directory {} does not exist", config.dir.display());
        }
        Ok(chainreader_storage::open_store(&config).await?)
    }
}

#[derive(Debug, Args)]
pub struct FilterArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// First block of the query range
    #[arg(long, default_value_t = 0)]
    start: u64,

    /// Exclusive end of the range (default: end of indexed data)
    #[arg(long)]
    stop: Option<u64>,

    /// Event type to match (repeatable)
    #[arg(long = "event-type")]
    event_types: Vec<String>,

    /// Event origin to match: BeginBlock | DeliverTx | EndBlock (repeatable)
    #[arg(long = "event-origin")]
    event_origins: Vec<EventOrigin>,

    /// Transaction message type URL to match (repeatable)
    #[arg(long = "message-type")]
    message_types: Vec<String>,

    /// Require a match in every requested category instead of any
    #[arg(long)]
    all: bool,

    /// Index to query (default: narrowest able to answer the filter)
    #[arg(long)]
    kind: Option<IndexKind>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

impl FilterArgs {
    fn spec(&self) -> FilterSpec {
        let policy = if self.all {
            CombinePolicy::All
        } else {
            CombinePolicy::Any
        };
        FilterSpec::new()
            .event_types(self.event_types.iter().cloned())
            .event_origins(self.event_origins.iter().copied())
            .message_types(self.message_types.iter().cloned())
            .policy(policy)
    }
}

pub async fn run_filter(args: FilterArgs) -> Result<()> {
    let spec = args.spec();
    spec.validate()?;
    let kind = args.kind.unwrap_or_else(|| spec.default_kind());

    let store = args.store.open().await?;
    let stop = match args.stop {
        Some(stop) => stop,
        None => {
            find_next_unindexed(store.as_ref(), args.start, &args.store.lookup_sizes, kind.short_name())
                .await?
        }
    };
    if stop <= args.start {
        bail!("no {kind} index covers block {}", args.start);
    }

    let evaluator = FilterEvaluator::new(store, args.store.lookup_sizes.clone());
    let matches = match evaluator.filter_with(&spec, kind, args.start..stop).await {
        Ok(matches) => matches,
        Err(e @ IndexError::NotIndexed { .. }) => bail!("{e}; try a smaller --stop"),
        Err(e) => return Err(e.into()),
    };

    if args.json {
        let out = serde_json::json!({
            "kind": kind.short_name(),
            "filter": spec,
            "start": args.start,
            "stop": stop,
            "matches": matches,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Index:   {kind}");
    println!("Filter:  {spec}");
    println!("Range:   [{}, {stop})", args.start);
    match matches {
        Some(blocks) => {
            println!("Matches: {}", blocks.len());
            for block in blocks {
                println!("  {block}");
            }
        }
        None => println!("Matches: none"),
    }
    Ok(())
}

#[derive(Debug, Args)]
pub struct NextUnindexedArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Index kind to inspect
    #[arg(long, default_value = "combined")]
    kind: IndexKind,

    /// Block to start from
    #[arg(long, default_value_t = 0)]
    start: u64,
}

pub async fn run_next_unindexed(args: NextUnindexedArgs) -> Result<()> {
    let store = args.store.open().await?;
    let next = find_next_unindexed(
        store.as_ref(),
        args.start,
        &args.store.lookup_sizes,
        args.kind.short_name(),
    )
    .await?;
    println!("{next}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: FilterArgs,
    }

    #[test]
    fn builds_spec_from_flags() {
        let args = Wrapper::parse_from([
            "filter",
            "--message-type",
            "/cosmos.bank.v1beta1.MsgSend",
            "--event-origin",
            "EndBlock",
            "--all",
            "--lookup-sizes",
            "1000,100",
        ])
        .args;
        let spec = args.spec();
        assert_eq!(spec.policy, CombinePolicy::All);
        assert!(spec.event_origins.contains(&EventOrigin::EndBlock));
        assert_eq!(spec.default_kind(), IndexKind::Combined);
        assert_eq!(args.store.lookup_sizes, [1000, 100]);
    }

    #[test]
    fn defaults() {
        let args = Wrapper::parse_from(["filter", "--event-type", "transfer"]).args;
        assert_eq!(args.store.lookup_sizes, DEFAULT_LOOKUP_SIZES);
        assert_eq!(args.store.index_backend, StoreBackend::Fs);
        assert_eq!(args.spec().default_kind(), IndexKind::EventType);
    }
}
