//! chainreader-core — foundation of the node-output ingestion pipeline.
//!
//! # Architecture
//!
//! ```text
//! line source (stdin / node subprocess / log tailer)
//!        │  bounded line queue
//!        ▼
//! ConsoleReader
//!   ├── LineParser       (DMLOG <KIND> <DATA> → ParsedEvent)
//!   ├── BlockAssembler   (BEGIN … END → Block, injected BlockEncoder)
//!   └── SinkRegistry     (indexer, block emitter, …)
//! ```

pub mod assembler;
pub mod config;
pub mod encoder;
pub mod error;
pub mod parser;
pub mod pb;
pub mod reader;
pub mod shutdown;
pub mod sink;
pub mod store;
pub mod types;

pub use assembler::BlockAssembler;
pub use config::{ReaderConfig, ReaderMode};
pub use encoder::{decode_payload, BlockEncoder, ProtoBlockEncoder};
pub use error::{ConfigError, ParseError, PipelineError, ReaderError, StoreError};
pub use parser::{LineParser, MarkerKind, ParsedEvent};
pub use reader::{line_channel, ConsoleReader, LineReceiver, LineSender};
pub use shutdown::{Shutdown, ShutdownHandle};
pub use sink::{BlockSink, BoxError, PipelineStats, SinkRegistry};
pub use store::IndexStore;
pub use types::{Block, BlockSummary, PayloadKind};
