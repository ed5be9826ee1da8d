//! Marker lines through the reader, the indexer, and back out of a filter.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use prost::Message;

use chainreader_core::pb;
use chainreader_core::{
    line_channel, BlockAssembler, ConsoleReader, IndexStore, LineParser, ProtoBlockEncoder,
    SinkRegistry,
};
use chainreader_index::{
    bundle_key, BlockIndexer, CombinePolicy, EventOrigin, FilterEvaluator, FilterSpec,
    IndexError, IndexKind, IndexProvider, NextMatch,
};
use chainreader_storage::{FsIndexStore, MemoryIndexStore};

fn b64(msg: &impl Message) -> String {
    STANDARD.encode(msg.encode_to_vec())
}

fn header_line(height: i64) -> String {
    let block = pb::Block {
        header: Some(pb::Header {
            chain_id: "testchain".into(),
            height,
            time: Some(prost_types::Timestamp {
                seconds: 1_646_000_000,
                nanos: 0,
            }),
            ..Default::default()
        }),
        result_begin_block: Some(pb::ResponseBeginBlock {
            events: vec![pb::Event {
                event_type: "mint".into(),
                attributes: vec![],
            }],
        }),
        ..Default::default()
    };
    format!("DMLOG BLOCK {}", b64(&block))
}

fn tx_line(height: u64, index: u32, messages: &[&str]) -> String {
    let tx = pb::TxResult {
        height,
        index,
        tx: Some(pb::Tx {
            body: Some(pb::TxBody {
                messages: messages
                    .iter()
                    .map(|url| prost_types::Any {
                        type_url: url.to_string(),
                        value: vec![],
                    })
                    .collect(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        result: Some(pb::ResponseDeliverTx {
            events: vec![pb::Event {
                event_type: "message".into(),
                attributes: vec![],
            }],
            ..Default::default()
        }),
        ..Default::default()
    };
    format!("DMLOG TX {}", b64(&tx))
}

fn session(height: u64, txs: &[&[&str]]) -> Vec<String> {
    let mut lines = vec![format!("DMLOG BEGIN {height}"), header_line(height as i64)];
    for (i, messages) in txs.iter().enumerate() {
        lines.push(tx_line(height, i as u32, messages));
    }
    lines.push(format!("DMLOG END {height}"));
    lines
}

async fn reader_over(lines: Vec<String>) -> ConsoleReader {
    let (tx, rx) = line_channel(lines.len() + 1);
    for line in lines {
        tx.send(line).await.unwrap();
    }
    drop(tx);
    ConsoleReader::new(
        rx,
        LineParser::new(),
        BlockAssembler::new(Arc::new(ProtoBlockEncoder), 1),
    )
}

#[tokio::test]
async fn single_block_flushes_size_one_bundle() {
    let store = Arc::new(MemoryIndexStore::new());
    let mut reader = reader_over(session(10, &[&["A", "B"], &["A"]])).await;

    let block = reader.read_block().await.unwrap().unwrap();
    assert_eq!(block.number, 10);
    assert_eq!(block.tx_count(), 2);
    assert!(reader.read_block().await.unwrap().is_none());

    let mut indexer = BlockIndexer::new(store.clone(), IndexKind::MessageType, 1).unwrap();
    indexer.index_block(&block.body, block.number).await.unwrap();
    assert_eq!(indexer.bundles_flushed(), 1);
    assert!(store.exists(&bundle_key("messagetype", 1, 10)).await.unwrap());
    assert_eq!(store.len().await, 1);

    let evaluator = FilterEvaluator::new(store.clone(), vec![1]);
    let hit = evaluator
        .filter(&FilterSpec::new().message_types(["A"]), 10..11)
        .await
        .unwrap();
    assert_eq!(hit, Some(vec![10]));

    // A key never seen is "no match", distinct from "not indexed".
    let miss = evaluator
        .filter(&FilterSpec::new().message_types(["Z"]), 10..11)
        .await
        .unwrap();
    assert_eq!(miss, None);

    let err = evaluator
        .filter(&FilterSpec::new().message_types(["A"]), 11..12)
        .await
        .unwrap_err();
    assert!(err.is_not_indexed());
}

#[tokio::test]
async fn pipeline_builds_every_index_kind() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn IndexStore> = Arc::new(FsIndexStore::open(dir.path()).await.unwrap());

    let mut lines = vec![];
    for height in 1..=20u64 {
        let txs: Vec<&[&str]> = match height % 4 {
            0 => vec![&["/bank.MsgSend"][..]],
            1 => vec![&["/staking.MsgDelegate"][..], &["/bank.MsgSend"][..]],
            _ => vec![],
        };
        lines.extend(session(height, &txs));
    }
    let mut reader = reader_over(lines).await;

    let mut sinks = SinkRegistry::new();
    for kind in IndexKind::ALL {
        let indexer = BlockIndexer::new(store.clone(), kind, 10)
            .unwrap()
            .with_first_streamable_block(1);
        sinks.register(Box::new(indexer));
    }
    let stats = sinks.run(&mut reader).await.unwrap();
    assert_eq!(stats.blocks, 20);
    assert_eq!(stats.last_block, Some(20));

    // [0,10) and [10,20) are complete; block 20 sits in an open bundle.
    for kind in IndexKind::ALL {
        let keys = store.list(&format!("{}/", kind.short_name())).await.unwrap();
        assert_eq!(keys.len(), 2, "{kind}: {keys:?}");
    }

    let evaluator = FilterEvaluator::new(store.clone(), vec![100, 10]);
    let send = FilterSpec::new().message_types(["/bank.MsgSend"]);
    assert_eq!(
        evaluator.filter(&send, 0..20).await.unwrap(),
        Some(vec![1, 4, 5, 8, 9, 12, 13, 16, 17])
    );
    assert_eq!(
        evaluator.filter(&send, 5..13).await.unwrap(),
        Some(vec![5, 8, 9, 12])
    );

    // Same answer from the combined index.
    assert_eq!(
        evaluator
            .filter_with(&send, IndexKind::Combined, 0..20)
            .await
            .unwrap(),
        Some(vec![1, 4, 5, 8, 9, 12, 13, 16, 17])
    );

    let delivered = FilterSpec::new().event_origins([EventOrigin::DeliverTx]);
    let with_txs = evaluator.filter(&delivered, 0..20).await.unwrap().unwrap();
    assert_eq!(with_txs, [1, 4, 5, 8, 9, 12, 13, 16, 17]);

    let delegate_or_mint = FilterSpec::new()
        .message_types(["/staking.MsgDelegate"])
        .event_types(["mint"]);
    let any = evaluator.filter(&delegate_or_mint, 0..20).await.unwrap().unwrap();
    assert_eq!(any.len(), 19);
    let all = evaluator
        .filter(&delegate_or_mint.policy(CombinePolicy::All), 0..20)
        .await
        .unwrap();
    assert_eq!(all, Some(vec![1, 5, 9, 13, 17]));

    // Block 20's bundle was never flushed.
    assert!(matches!(
        evaluator.filter(&send, 0..21).await,
        Err(IndexError::NotIndexed { block: 20, .. })
    ));

    let mut provider = IndexProvider::new(evaluator, send).unwrap();
    assert!(provider.within_range(19).await.unwrap());
    assert!(!provider.within_range(20).await.unwrap());
    assert!(provider.matches(4).await.unwrap());
    assert!(!provider.matches(6).await.unwrap());
    assert_eq!(provider.next_matching(9, 20).await.unwrap(), NextMatch::Found(12));
    assert_eq!(provider.next_matching(17, 19).await.unwrap(), NextMatch::NotFound);
    assert_eq!(
        provider.next_matching(17, 30).await.unwrap(),
        NextMatch::PassedIndexBoundary(20)
    );
}
