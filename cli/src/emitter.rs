//! JSON-lines block summary sink.

use std::io::Write;

use async_trait::async_trait;
use chainreader_core::{Block, BlockSink, BoxError};

/// Writes one [`BlockSummary`](chainreader_core::BlockSummary) per line.
///
/// Output is flushed on `close`, so `W` should be buffered.
pub struct SummaryEmitter<W> {
    out: W,
}

impl<W: Write + Send> SummaryEmitter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

#[async_trait]
impl<W: Write + Send> BlockSink for SummaryEmitter<W> {
    fn name(&self) -> &str {
        "emitter"
    }

    async fn process_block(&mut self, block: &Block) -> Result<(), BoxError> {
        serde_json::to_writer(&mut self.out, &block.summary())?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BoxError> {
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainreader_core::pb;
    use chainreader_core::types::{PayloadKind, PAYLOAD_VERSION};

    fn block(number: u64) -> Block {
        Block {
            number,
            id: "AB".into(),
            previous_id: "CD".into(),
            lib_num: number - 1,
            timestamp: Default::default(),
            payload_kind: PayloadKind::Cosmos,
            payload_version: PAYLOAD_VERSION,
            payload: vec![1, 2, 3],
            body: pb::Block::default(),
        }
    }

    #[tokio::test]
    async fn writes_one_json_line_per_block() {
        let mut sink = SummaryEmitter::new(Vec::new());
        sink.process_block(&block(7)).await.unwrap();
        sink.process_block(&block(8)).await.unwrap();
        sink.close().await.unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["number"], 7);
        assert_eq!(lines[1]["lib_num"], 7);
        assert_eq!(lines[1]["payload_size"], 3);
    }

    #[derive(Default)]
    struct CountingWriter {
        data: Vec<u8>,
        flushes: usize,
    }

    impl Write for CountingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn flushes_only_on_close() {
        let mut sink = SummaryEmitter::new(CountingWriter::default());
        for n in 1..=5 {
            sink.process_block(&block(n)).await.unwrap();
        }
        assert_eq!(sink.out.flushes, 0);
        sink.close().await.unwrap();

        let out = sink.into_inner();
        assert_eq!(out.flushes, 1);
        assert_eq!(out.data.iter().filter(|b| **b == b'\n').count(), 5);
    }
}
