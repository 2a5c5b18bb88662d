//! Line-oriented instrument transports.
//!
//! A [`Connector`] opens one [`Transport`] per channel. The worker owns the transport
//! exclusively for its whole life and talks to it in lines: commands go out with a
//! terminator, responses come back one `\n`-terminated line at a time.
//!
//! Three implementations ship with the crate:
//! - [`serial::SerialConnector`] opens a real port through `serialport`
//! - [`simulated::SimulatedConnector`] answers with random counts, for running without hardware
//! - [`mock::MockConnector`] replays scripted replies and records traffic, for tests

pub mod mock;
pub mod serial;
pub mod simulated;

use crate::config::ChannelConfig;
use crate::error::TransportError;

pub use mock::{MockConnector, MockHandle, MockReply, MockTransport};
pub use serial::SerialConnector;
pub use simulated::SimulatedConnector;

/// An open, exclusively owned connection to one instrument.
pub trait Transport: Send {
    /// Write `line` followed by `terminator`.
    fn write_line(&mut self, line: &str, terminator: &str) -> Result<(), TransportError>;

    /// Read one response line, without its trailing line break.
    ///
    /// # Errors
    /// [`TransportError::Timeout`] when nothing complete arrived within the read timeout,
    /// [`TransportError::Decode`] for bytes that are not UTF-8.
    fn read_line(&mut self) -> Result<String, TransportError>;

    /// Discard anything waiting in the input buffer.
    fn clear_input(&mut self) -> Result<(), TransportError>;
}

/// Opens transports for configured channels.
pub trait Connector: Send + Sync {
    fn connect(&self, channel: &ChannelConfig) -> Result<Box<dyn Transport>, TransportError>;
}

/// Turn raw line bytes into text, dropping the trailing `\r`/`\n`.
pub(crate) fn decode_line(bytes: Vec<u8>) -> Result<String, TransportError> {
    let mut line = String::from_utf8(bytes)?;
    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);
    Ok(line)
}
