//! chainreader-source — producers for the bounded line queue.
//!
//! Sources:
//! - [`line_reader`] — any byte stream, including piped standard input
//! - [`node_runner`] — a supervised node subprocess (stdout → lines)
//! - [`tailer`] — rotating log files in a directory, resumable via a ledger

pub mod error;
pub mod file_reader;
pub mod ledger;
pub mod line_reader;
pub mod node_runner;
pub mod stderr_filter;
pub mod tailer;

pub use error::SourceError;
pub use file_reader::{FileReader, ReadOutcome, StopReason};
pub use ledger::{FileLedger, LedgerEntry};
pub use line_reader::{read_lines, read_stdin};
pub use node_runner::{NodeRunner, RunnerError};
pub use stderr_filter::StderrFilter;
pub use tailer::{FileTailer, TailStats};
