//! Block sinks and the registry that feeds them.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::reader::ConsoleReader;
use crate::types::Block;

/// Boxed error returned by sink implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A consumer of finalized blocks.
///
/// Blocks arrive one at a time, in strictly increasing number order, from a
/// single producer.
#[async_trait]
pub trait BlockSink: Send {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    async fn process_block(&mut self, block: &Block) -> Result<(), BoxError>;

    /// Called once after the last block of the stream.
    async fn close(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Counters reported after a pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub blocks: u64,
    pub transactions: u64,
    pub last_block: Option<u64>,
}

/// Ordered list of sinks; each block is offered to every sink in
/// registration order.
#[derive(Default)]
pub struct SinkRegistry {
    sinks: Vec<Box<dyn BlockSink>>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, sink: Box<dyn BlockSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Hand one block to every sink, stopping at the first failure.
    pub async fn dispatch(&mut self, block: &Block) -> Result<(), PipelineError> {
        for sink in &mut self.sinks {
            sink.process_block(block)
                .await
                .map_err(|e| PipelineError::Sink {
                    sink: sink.name().to_string(),
                    block_number: block.number,
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    /// Drain `reader` into the registered sinks until the line queue closes.
    ///
    /// Parse and sink failures stop the run immediately; sinks are not closed
    /// in that case.
    pub async fn run(&mut self, reader: &mut ConsoleReader) -> Result<PipelineStats, PipelineError> {
        let mut stats = PipelineStats::default();

        while let Some(block) = reader.read_block().await? {
            self.dispatch(&block).await?;
            stats.blocks += 1;
            stats.transactions += block.tx_count() as u64;
            stats.last_block = Some(block.number);
            debug!(block = block.number, txs = block.tx_count(), "block dispatched");
        }

        for sink in &mut self.sinks {
            sink.close().await.map_err(|e| PipelineError::Sink {
                sink: sink.name().to_string(),
                block_number: stats.last_block.unwrap_or(0),
                reason: e.to_string(),
            })?;
        }

        info!(blocks = stats.blocks, last_block = ?stats.last_block, "pipeline finished");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::BlockAssembler;
    use crate::encoder::ProtoBlockEncoder;
    use crate::parser::LineParser;
    use crate::reader::line_channel;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        seen: Arc<Mutex<Vec<u64>>>,
        closed: Arc<Mutex<bool>>,
    }

    #[async_trait]
    impl BlockSink for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn process_block(&mut self, block: &Block) -> Result<(), BoxError> {
            self.seen.lock().unwrap().push(block.number);
            Ok(())
        }

        async fn close(&mut self) -> Result<(), BoxError> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }

    struct FailAt(u64);

    #[async_trait]
    impl BlockSink for FailAt {
        fn name(&self) -> &str {
            "fail-at"
        }

        async fn process_block(&mut self, block: &Block) -> Result<(), BoxError> {
            if block.number == self.0 {
                return Err("boom".into());
            }
            Ok(())
        }
    }

    async fn reader(heights: &[u64]) -> ConsoleReader {
        let (tx, rx) = line_channel(64);
        for h in heights {
            tx.send(format!("DMLOG BEGIN {h}")).await.unwrap();
            tx.send("DMLOG BLOCK Cg0Yt7m9AiIGCIXPuYEG".into()).await.unwrap();
            tx.send("DMLOG TX CLe5vQIQAQ==".into()).await.unwrap();
            tx.send(format!("DMLOG END {h}")).await.unwrap();
        }
        drop(tx);
        ConsoleReader::new(
            rx,
            LineParser::new(),
            BlockAssembler::new(Arc::new(ProtoBlockEncoder), 1),
        )
    }

    #[tokio::test]
    async fn run_feeds_every_sink_in_order() {
        let seen = Arc::new(Mutex::new(vec![]));
        let closed = Arc::new(Mutex::new(false));
        let mut registry = SinkRegistry::new();
        registry.register(Box::new(Recorder {
            seen: seen.clone(),
            closed: closed.clone(),
        }));

        let mut reader = reader(&[3, 4, 9]).await;
        let stats = registry.run(&mut reader).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![3, 4, 9]);
        assert!(*closed.lock().unwrap());
        assert_eq!(stats.blocks, 3);
        assert_eq!(stats.transactions, 3);
        assert_eq!(stats.last_block, Some(9));
    }

    #[tokio::test]
    async fn sink_failure_names_sink_and_block() {
        let mut registry = SinkRegistry::new();
        registry.register(Box::new(FailAt(4)));
        let mut reader = reader(&[3, 4, 5]).await;
        let err = registry.run(&mut reader).await.unwrap_err();
        match err {
            PipelineError::Sink {
                sink, block_number, ..
            } => {
                assert_eq!(sink, "fail-at");
                assert_eq!(block_number, 4);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn failure_stops_dispatch_without_closing() {
        let seen = Arc::new(Mutex::new(vec![]));
        let closed = Arc::new(Mutex::new(false));
        let mut registry = SinkRegistry::new();
        registry.register(Box::new(FailAt(4)));
        registry.register(Box::new(Recorder {
            seen: seen.clone(),
            closed: closed.clone(),
        }));

        let mut reader = reader(&[3, 4, 5]).await;
        assert!(registry.run(&mut reader).await.is_err());
        assert_eq!(*seen.lock().unwrap(), vec![3]);
        assert!(!*closed.lock().unwrap());
    }
}
