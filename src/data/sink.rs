//! Row consumers fed by the synchronizer.
//!
//! Sinks run on the synchronizer thread, so every implementation must return quickly.
//! Anything slow (a GUI, a network client) should sit behind a [`ForwardSink`] and do its
//! work on its own thread.

use chrono::NaiveDate;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, info};

use crate::error::SinkError;
use crate::record::{SyncRow, MISSING_MARKER};

/// Consumer of synchronized rows.
pub trait RowSink: Send {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    /// Called before the first row and again whenever the local date changes.
    fn on_day(&mut self, _day: NaiveDate) -> Result<(), SinkError> {
        Ok(())
    }

    fn on_row(&mut self, row: &SyncRow) -> Result<(), SinkError>;

    /// Flush and release resources. Called once when acquisition stops.
    fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Hands rows to another thread over a bounded channel without ever blocking.
///
/// Rows are dropped while the receiver is behind.
#[derive(Debug)]
pub struct ForwardSink {
    sender: Sender<SyncRow>,
    disconnected: bool,
    dropped: u64,
}

impl ForwardSink {
    /// A sink and the receiver its rows arrive on.
    pub fn channel(capacity: usize) -> (Self, Receiver<SyncRow>) {
        let (sender, receiver) = bounded(capacity.max(1));
        (
            Self {
                sender,
                disconnected: false,
                dropped: 0,
            },
            receiver,
        )
    }

    /// Rows dropped because the receiver was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl RowSink for ForwardSink {
    fn name(&self) -> &str {
        "forward"
    }

    fn on_row(&mut self, row: &SyncRow) -> Result<(), SinkError> {
        if self.disconnected {
            return Ok(());
        }
        match self.sender.try_send(row.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                debug!(tick = row.tick(), "Display is behind, dropping row");
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => {
                self.disconnected = true;
                Err(SinkError::Disconnected)
            }
        }
    }
}

/// Console display: one line per row with each channel's headline value.
#[derive(Debug)]
pub struct LogSink {
    field: String,
}

impl LogSink {
    /// Show `field` (typically the concentration) for every channel.
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }

    fn summary(&self, row: &SyncRow) -> String {
        row.records()
            .iter()
            .map(|record| {
                let value = record
                    .get(&self.field)
                    .map(|v| v.render(MISSING_MARKER).into_owned())
                    .unwrap_or_else(|| MISSING_MARKER.to_string());
                format!("{}={}", record.channel(), value)
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new("concentration")
    }
}

impl RowSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn on_day(&mut self, day: NaiveDate) -> Result<(), SinkError> {
        info!("Logging day {}", day);
        Ok(())
    }

    fn on_row(&mut self, row: &SyncRow) -> Result<(), SinkError> {
        info!(tick = row.tick(), "{}", self.summary(row));
        Ok(())
    }
}
