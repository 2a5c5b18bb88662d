//! Scripted transport for testing without hardware.
//!
//! A [`MockHandle`] is the test's side of a [`MockTransport`]: it queues replies,
//! injects failures, and inspects every line the worker wrote. Handles stay valid
//! after the transport has been moved into a worker thread.
//!
//! # Example
//!
//! ```
//! use cpc_daq::transport::{Connector, MockConnector, MockReply};
//! use cpc_daq::config::ChannelConfig;
//!
//! let mut connector = MockConnector::new();
//! let handle = connector.add("3776");
//! handle.push_line("450,0,OK");
//! handle.push(MockReply::Timeout);
//!
//! let channel = ChannelConfig::new("3776", "MOCK0", vec!["cpc_name".into(), "datetime".into()]);
//! let mut transport = connector.connect(&channel).unwrap();
//! transport.write_line("RALL", "\r").unwrap();
//! assert_eq!(transport.read_line().unwrap(), "450,0,OK");
//! assert!(transport.read_line().is_err());
//! assert_eq!(handle.written(), vec!["RALL".to_string()]);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::ChannelConfig;
use crate::error::TransportError;
use crate::transport::{decode_line, Connector, Transport};

/// One scripted response to a `read_line`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// A complete line (without terminator).
    Line(String),
    /// Nothing arrived within the read timeout.
    Timeout,
    /// Raw bytes, typically not valid UTF-8.
    Garbage(Vec<u8>),
    /// The device went away for good.
    Closed,
}

#[derive(Debug)]
struct MockState {
    script: VecDeque<MockReply>,
    fallback: MockReply,
    read_delay: Duration,
    writes: Vec<(String, String)>,
    reads: usize,
    clears: usize,
    connections: usize,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            script: VecDeque::new(),
            fallback: MockReply::Timeout,
            read_delay: Duration::ZERO,
            writes: Vec::new(),
            reads: 0,
            clears: 0,
            connections: 0,
        }
    }
}

/// Test-side control of a mock instrument.
#[derive(Debug, Clone, Default)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    /// An instrument with an empty script that times out on every read.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue one reply.
    pub fn push(&self, reply: MockReply) {
        self.state().script.push_back(reply);
    }

    /// Queue one reply line.
    pub fn push_line(&self, line: impl Into<String>) {
        self.push(MockReply::Line(line.into()));
    }

    /// Reply used once the script runs out. Defaults to [`MockReply::Timeout`].
    pub fn set_fallback(&self, reply: MockReply) {
        self.state().fallback = reply;
    }

    /// Block every read for `delay` before answering, like a slow device.
    pub fn set_read_delay(&self, delay: Duration) {
        self.state().read_delay = delay;
    }

    /// Make every following read report a closed transport.
    pub fn close(&self) {
        let mut state = self.state();
        state.script.clear();
        state.fallback = MockReply::Closed;
    }

    /// Lines written so far, without terminators.
    pub fn written(&self) -> Vec<String> {
        self.state().writes.iter().map(|(line, _)| line.clone()).collect()
    }

    /// `(line, terminator)` pairs written so far.
    pub fn writes(&self) -> Vec<(String, String)> {
        self.state().writes.clone()
    }

    /// Number of `read_line` calls.
    pub fn reads(&self) -> usize {
        self.state().reads
    }

    /// Number of `clear_input` calls.
    pub fn clears(&self) -> usize {
        self.state().clears
    }

    /// How many times a transport was opened on this handle.
    pub fn connections(&self) -> usize {
        self.state().connections
    }

    /// Replies still queued.
    pub fn pending(&self) -> usize {
        self.state().script.len()
    }

    /// Open a transport driven by this handle.
    pub fn transport(&self) -> MockTransport {
        self.state().connections += 1;
        MockTransport {
            handle: self.clone(),
        }
    }
}

/// Device side of a [`MockHandle`].
#[derive(Debug)]
pub struct MockTransport {
    handle: MockHandle,
}

impl Transport for MockTransport {
    fn write_line(&mut self, line: &str, terminator: &str) -> Result<(), TransportError> {
        self.handle
            .state()
            .writes
            .push((line.to_string(), terminator.to_string()));
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, TransportError> {
        let (reply, delay) = {
            let mut state = self.handle.state();
            state.reads += 1;
            let reply = match state.script.pop_front() {
                Some(reply) => reply,
                None => state.fallback.clone(),
            };
            (reply, state.read_delay)
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        match reply {
            MockReply::Line(line) => Ok(line),
            MockReply::Timeout => Err(TransportError::Timeout),
            MockReply::Garbage(bytes) => decode_line(bytes),
            MockReply::Closed => Err(TransportError::Closed),
        }
    }

    fn clear_input(&mut self) -> Result<(), TransportError> {
        self.handle.state().clears += 1;
        Ok(())
    }
}

/// Connector resolving channel names to mock instruments.
///
/// Channels without a registered handle, or registered with [`MockConnector::refuse`],
/// fail to open like a missing serial port.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    handles: HashMap<String, MockHandle>,
    refused: HashSet<String>,
}

impl MockConnector {
    /// A connector with no instruments registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mock instrument for `channel` and return its handle.
    pub fn add(&mut self, channel: impl Into<String>) -> MockHandle {
        let handle = MockHandle::new();
        self.handles.insert(channel.into(), handle.clone());
        handle
    }

    /// Make opening `channel` fail.
    pub fn refuse(&mut self, channel: impl Into<String>) {
        self.refused.insert(channel.into());
    }

    /// Handle registered for `channel`.
    pub fn handle(&self, channel: &str) -> Option<&MockHandle> {
        self.handles.get(channel)
    }
}

impl Connector for MockConnector {
    fn connect(&self, channel: &ChannelConfig) -> Result<Box<dyn Transport>, TransportError> {
        let refuse = |reason: &str| TransportError::Open {
            port: channel.serial.port.clone(),
            reason: reason.to_string(),
        };
        if self.refused.contains(&channel.name) {
            return Err(refuse("port refused by mock"));
        }
        match self.handles.get(&channel.name) {
            Some(handle) => Ok(Box::new(handle.transport())),
            None => Err(refuse("no such mock port")),
        }
    }
}
