//! Hardware-free transport that answers with random counts.
//!
//! Every command written gets one reply line holding a random integer in `0..1000`;
//! a read with nothing pending (a streaming channel) produces one as well. Useful for
//! exercising the acquisition pipeline and the CSV output without instruments attached.

use rand::Rng;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

use crate::config::ChannelConfig;
use crate::error::TransportError;
use crate::transport::{Connector, Transport};

/// Upper bound (exclusive) of simulated counts.
pub const MAX_COUNT: u32 = 1000;

/// Connector producing [`SimulatedTransport`]s.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedConnector {
    latency: Duration,
}

impl SimulatedConnector {
    /// Simulated instruments answering after 20 ms.
    pub fn new() -> Self {
        Self {
            latency: Duration::from_millis(20),
        }
    }

    /// Set the simulated response latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

impl Default for SimulatedConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for SimulatedConnector {
    fn connect(&self, channel: &ChannelConfig) -> Result<Box<dyn Transport>, TransportError> {
        debug!(channel = %channel.name, "Simulating '{}' on {}", channel.name, channel.serial.port);
        Ok(Box::new(SimulatedTransport {
            latency: self.latency,
            pending: VecDeque::new(),
        }))
    }
}

/// A fake instrument that answers every command.
#[derive(Debug)]
pub struct SimulatedTransport {
    latency: Duration,
    pending: VecDeque<String>,
}

impl SimulatedTransport {
    fn random_count() -> String {
        rand::thread_rng().gen_range(0..MAX_COUNT).to_string()
    }
}

impl Transport for SimulatedTransport {
    fn write_line(&mut self, _line: &str, _terminator: &str) -> Result<(), TransportError> {
        self.pending.push_back(Self::random_count());
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, TransportError> {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        Ok(self.pending.pop_front().unwrap_or_else(Self::random_count))
    }

    fn clear_input(&mut self) -> Result<(), TransportError> {
        self.pending.clear();
        Ok(())
    }
}
