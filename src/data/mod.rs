//! Row sinks: where synchronized rows go.
pub mod sink;
#[cfg(feature = "storage_csv")]
pub mod storage;

pub use sink::{ForwardSink, LogSink, RowSink};
#[cfg(feature = "storage_csv")]
pub use storage::CsvSink;
