//! Channel worker: one thread per instrument.
//!
//! ```text
//! Created -> Connecting -> Startup -> Polling <-> Recovering
//!                |                        |
//!                v                        v
//!              Failed                  Stopped
//! ```
//!
//! A worker owns its transport and its schedule. Each tick it polls the device, turns
//! the response into a [`Record`], and pushes it onto its queue without blocking.
//! Transport trouble is reported as an explicit [`PollOutcome`] so the recovery policy
//! is a single `match` in [`ChannelWorker::run`]: transient failures skip one tick,
//! only a closed transport ends the channel.

use chrono::{DateTime, Local, Utc};
use crossbeam_channel::Sender;
use std::fmt::Write as _;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::ChannelConfig;
use crate::error::{DaqError, TransportError};
use crate::queue::RecordSender;
use crate::record::{Record, Schema};
use crate::scheduler::Scheduler;
use crate::stop::StopToken;
use crate::transport::{Connector, Transport};

/// Lifecycle of a channel worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Built, not started
    Created,
    /// Opening the transport
    Connecting,
    /// Sending start and time-sync commands
    Startup,
    /// Last poll produced a record
    Polling,
    /// Last poll failed transiently; retrying next tick
    Recovering,
    /// Exited after a stop request
    Stopped,
    /// Exited because the channel is unavailable
    Failed,
}

impl WorkerState {
    /// Whether the worker has exited.
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerState::Stopped | WorkerState::Failed)
    }
}

/// State change notification for health displays.
#[derive(Debug, Clone)]
pub struct WorkerStatus {
    /// Channel name
    pub channel: String,
    /// State just entered
    pub state: WorkerState,
    /// When the state changed
    pub at: DateTime<Local>,
    /// Error text for `Recovering` and `Failed`
    pub detail: Option<String>,
}

/// Result of one poll step.
#[derive(Debug)]
pub enum PollOutcome {
    /// A record for this tick
    Record(Record),
    /// Transient failure; this tick produces nothing.
    Skip(TransportError),
    /// The transport is gone; the channel cannot continue.
    Fatal(TransportError),
}

impl PollOutcome {
    fn from_error(err: TransportError) -> Self {
        if err.is_fatal() {
            PollOutcome::Fatal(err)
        } else {
            PollOutcome::Skip(err)
        }
    }
}

/// A read that failed partway leaves the tail of the line in the input buffer; drop
/// it so the next tick starts on a fresh line.
fn read_failed(transport: &mut dyn Transport, channel: &str, err: TransportError) -> PollOutcome {
    if !err.is_fatal() {
        if let Err(e) = transport.clear_input() {
            debug!(channel = %channel, "Could not clear input after failed read: {}", e);
        }
    }
    PollOutcome::from_error(err)
}

/// Drives one instrument: connect, startup, then poll on schedule until stopped.
pub struct ChannelWorker {
    config: ChannelConfig,
    schema: Arc<Schema>,
    queue: RecordSender,
    status: Option<Sender<WorkerStatus>>,
    transport: Option<Box<dyn Transport>>,
    state: WorkerState,
    resync_bucket: Option<i64>,
    records: u64,
    skipped_polls: u64,
}

impl std::fmt::Debug for ChannelWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelWorker")
            .field("channel", &self.config.name)
            .field("state", &self.state)
            .field("connected", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}

impl ChannelWorker {
    /// A worker for an already validated channel, pushing onto `queue`.
    pub fn new(config: ChannelConfig, queue: RecordSender) -> Self {
        let schema = Schema::from_config(&config);
        Self {
            config,
            schema,
            queue,
            status: None,
            transport: None,
            state: WorkerState::Created,
            resync_bucket: None,
            records: 0,
            skipped_polls: 0,
        }
    }

    /// Report every state change on `status`.
    pub fn with_status(mut self, status: Sender<WorkerStatus>) -> Self {
        self.status = Some(status);
        self
    }

    /// Channel name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Current state.
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Schema of the records this worker produces.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Records produced so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Polls that were skipped because of transient transport errors.
    pub fn skipped_polls(&self) -> u64 {
        self.skipped_polls
    }

    fn set_state(&mut self, state: WorkerState, detail: Option<String>) {
        if self.state == state {
            return;
        }
        debug!(channel = %self.config.name, from = ?self.state, to = ?state, "State change");
        self.state = state;
        if let Some(status) = &self.status {
            // listener may be gone
            let _ = status.send(WorkerStatus {
                channel: self.config.name.clone(),
                state,
                at: Local::now(),
                detail,
            });
        }
    }

    fn fail(&mut self, reason: String) -> DaqError {
        error!(channel = %self.config.name, "Channel {} unavailable: {}", self.config.name, reason);
        self.transport = None;
        self.set_state(WorkerState::Failed, Some(reason.clone()));
        DaqError::ChannelUnavailable {
            channel: self.config.name.clone(),
            reason,
        }
    }

    /// Open the transport and drop stale input.
    ///
    /// # Errors
    /// [`DaqError::ChannelUnavailable`] when the port cannot be opened; the worker is
    /// then `Failed` and never polls.
    pub fn connect(&mut self, connector: &dyn Connector) -> Result<(), DaqError> {
        self.set_state(WorkerState::Connecting, None);
        let mut transport = match connector.connect(&self.config) {
            Ok(transport) => transport,
            Err(e) => return Err(self.fail(e.to_string())),
        };
        if let Err(e) = transport.clear_input() {
            warn!(channel = %self.config.name, "Could not clear input on connect: {}", e);
        }
        info!(
            channel = %self.config.name,
            port = %self.config.serial.port,
            "Connected {} on {}",
            self.config.name,
            self.config.serial.port
        );
        self.transport = Some(transport);
        Ok(())
    }

    /// Send the start commands and, if configured, the current date and time.
    ///
    /// Also records the resync bucket so that periodic resync counts from here.
    pub fn startup(&mut self) -> Result<(), TransportError> {
        self.set_state(WorkerState::Startup, None);
        self.resync_bucket = self.bucket(Utc::now().timestamp());
        self.send_startup()
    }

    fn send_startup(&mut self) -> Result<(), TransportError> {
        let transport = self.transport.as_mut().ok_or(TransportError::Closed)?;
        let config = &self.config;

        for command in &config.start_commands {
            transport.write_line(command, &config.start_terminator)?;
            if config.startup_reply {
                match transport.read_line() {
                    Ok(reply) => debug!(channel = %config.name, "Discarding reply to {}: {}", command, reply),
                    Err(TransportError::Timeout) => {
                        debug!(channel = %config.name, "No reply to start command {}", command)
                    }
                    Err(e) => return Err(e),
                }
            } else {
                std::thread::sleep(config.settle());
                transport.clear_input()?;
            }
        }

        if config.set_time {
            let now = Local::now();
            for pattern in &config.time_formats {
                let mut command = String::new();
                if write!(command, "{}", now.format(pattern)).is_err() {
                    warn!(channel = %config.name, "Skipping unusable time format {}", pattern);
                    continue;
                }
                transport.write_line(&command, &config.start_terminator)?;
                std::thread::sleep(config.settle());
                transport.clear_input()?;
            }
        }
        Ok(())
    }

    fn bucket(&self, unix_secs: i64) -> Option<i64> {
        self.config
            .periodic_resync_secs
            .map(|n| unix_secs.div_euclid(n.max(1) as i64))
    }

    /// Re-run startup when the wall clock has entered a new resync window.
    ///
    /// Returns whether a resync was attempted. Failures are transient and only logged.
    pub fn resync_if_due(&mut self, unix_secs: i64) -> bool {
        let bucket = self.bucket(unix_secs);
        if bucket.is_none() || bucket == self.resync_bucket {
            return false;
        }
        self.resync_bucket = bucket;
        info!(channel = %self.config.name, "Periodic resync of {}", self.config.name);
        if let Err(e) = self.send_startup() {
            warn!(channel = %self.config.name, "Resync of {} failed: {}", self.config.name, e);
        }
        true
    }

    /// Poll the device once and build a record from the response.
    pub fn poll_once(&mut self) -> PollOutcome {
        let Some(transport) = self.transport.as_mut() else {
            return PollOutcome::Fatal(TransportError::Closed);
        };
        let config = &self.config;

        let mut tokens: Vec<String> = Vec::new();
        if config.poll_commands.is_empty() {
            match transport.read_line() {
                Ok(line) => tokens.extend(line.split(config.delimiter.as_str()).map(str::to_string)),
                Err(e) => return read_failed(transport.as_mut(), &config.name, e),
            }
        } else {
            for command in &config.poll_commands {
                if let Err(e) = transport.write_line(command, &config.command_terminator) {
                    return PollOutcome::from_error(e);
                }
                match transport.read_line() {
                    Ok(line) => tokens.extend(line.split(config.delimiter.as_str()).map(str::to_string)),
                    Err(e) => return read_failed(transport.as_mut(), &config.name, e),
                }
            }
        }

        let capacity = self.schema.token_capacity();
        if tokens.len() > capacity {
            debug!(
                channel = %config.name,
                "Dropping {} surplus token(s) from {}",
                tokens.len() - capacity,
                config.name
            );
        }
        let record = Record::from_tokens(&self.schema, Local::now(), &tokens);
        if record.is_partial() {
            debug!(channel = %config.name, tokens = tokens.len(), "Partial record from {}", config.name);
        }
        PollOutcome::Record(record)
    }

    /// Connect, run startup, then poll on schedule until `stop` fires.
    ///
    /// # Errors
    /// [`DaqError::ChannelUnavailable`] when the channel could not be opened or its
    /// transport closed. A cooperative stop returns `Ok(())`.
    pub fn run(&mut self, connector: &dyn Connector, stop: &StopToken) -> Result<(), DaqError> {
        self.connect(connector)?;
        if let Err(e) = self.startup() {
            if e.is_fatal() {
                return Err(self.fail(e.to_string()));
            }
            warn!(channel = %self.config.name, "Startup of {} incomplete: {}", self.config.name, e);
        }

        let mut scheduler = Scheduler::new(self.config.name.clone(), self.config.interval(), Instant::now())?;
        self.set_state(WorkerState::Polling, None);

        while !stop.is_stopped() {
            self.resync_if_due(Utc::now().timestamp());

            let outcome = self.poll_once();
            if stop.is_stopped() {
                break;
            }
            match outcome {
                PollOutcome::Record(record) => {
                    self.records += 1;
                    let dropped = self.queue.push(record);
                    if dropped > 0 {
                        debug!(channel = %self.config.name, dropped, "Queue full, dropped oldest record");
                    }
                    self.set_state(WorkerState::Polling, None);
                }
                PollOutcome::Skip(e) => {
                    self.skipped_polls += 1;
                    warn!(
                        channel = %self.config.name,
                        at = %Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                        "Error: {} skipped a tick: {}",
                        self.config.name,
                        e
                    );
                    self.set_state(WorkerState::Recovering, Some(e.to_string()));
                }
                PollOutcome::Fatal(e) => return Err(self.fail(e.to_string())),
            }

            let plan = scheduler.advance(Instant::now());
            if stop.sleep(plan.sleep) {
                break;
            }
        }

        self.transport = None;
        self.set_state(WorkerState::Stopped, None);
        info!(
            channel = %self.config.name,
            records = self.records,
            skipped = self.skipped_polls,
            "Stopped {}",
            self.config.name
        );
        Ok(())
    }

    /// Run on a dedicated thread named `cpc-<channel>`.
    pub fn spawn(
        mut self,
        connector: Arc<dyn Connector>,
        stop: StopToken,
    ) -> Result<JoinHandle<Result<(), DaqError>>, DaqError> {
        std::thread::Builder::new()
            .name(format!("cpc-{}", self.config.name))
            .spawn(move || self.run(connector.as_ref(), &stop))
            .map_err(DaqError::Spawn)
    }
}
