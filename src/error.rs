//! Custom error types for the application.
//!
//! This module defines the error taxonomy for acquisition. Each concern owns a
//! `thiserror` enum, and `DaqError` folds them together so that `?` works across
//! module boundaries.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: the profile could not be read, or it parsed but is logically wrong
//!   (zero interval, missing derived field, duplicate channel names). Always fatal,
//!   surfaced before any channel starts.
//! - **`Transport`**: serial-level failures. Everything except [`TransportError::Closed`]
//!   is transient: the worker skips the tick and polls again at the next scheduled wake.
//! - **`Sink`**: a row consumer failed. Logged by the synchronizer, never escalated.
//! - **`ChannelUnavailable`**: a channel never reached polling, or lost its transport
//!   for good. Other channels are unaffected.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Errors raised while loading or validating an instrument profile.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Profile path does not exist
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),

    /// Figment could not build the profile
    #[error("Configuration could not be extracted: {0}")]
    Extract(#[from] Box<figment::Error>),

    /// YAML syntax or shape error
    #[error("Configuration YAML is malformed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Profile could not be read
    #[error("Configuration I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Interval is zero, negative, not finite or out of range
    #[error("Interval for '{owner}' must be a positive number of seconds (1 ns to 10 years), got {value}")]
    NonPositiveInterval { owner: String, value: f64 },

    /// A channel is logically wrong
    #[error("Invalid configuration for channel '{channel}': {reason}")]
    Invalid { channel: String, reason: String },

    /// The profile as a whole is logically wrong
    #[error("Configuration validation error: {0}")]
    Validation(String),
}

impl From<figment::Error> for ConfigError {
    fn from(value: figment::Error) -> Self {
        ConfigError::Extract(Box::new(value))
    }
}

/// Errors raised by an instrument transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Port could not be opened
    #[error("Failed to open serial port '{port}': {reason}")]
    Open { port: String, reason: String },

    /// No complete line before the read timeout
    #[error("Timed out waiting for a response line")]
    Timeout,

    /// Line was not UTF-8
    #[error("Response was not valid UTF-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),

    /// Other port I/O failure
    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport is gone for good
    #[error("Transport closed")]
    Closed,

    /// Built without serial support
    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    FeatureDisabled,
}

impl TransportError {
    /// Whether this error ends the channel instead of skipping one tick.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Closed)
    }
}

/// Errors raised by row sinks.
#[derive(Error, Debug)]
pub enum SinkError {
    /// File I/O failure
    #[error("Sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding failure
    #[cfg(feature = "storage_csv")]
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    /// The receiving end of a forward sink is gone
    #[error("Sink receiver disconnected")]
    Disconnected,
}

/// Top-level error for the acquisition library.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Profile error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Sink error
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// Channel never reached polling or lost its transport
    #[error("Channel '{channel}' is unavailable: {reason}")]
    ChannelUnavailable { channel: String, reason: String },

    /// A worker or synchronizer thread panicked
    #[error("Worker thread for '{0}' panicked")]
    WorkerPanicked(String),

    /// The OS refused to create a thread
    #[error("Failed to spawn thread: {0}")]
    Spawn(std::io::Error),

    /// One entry per thread that did not finish cleanly
    #[error("Shutdown failed with errors")]
    ShutdownFailed(Vec<DaqError>),
}

impl DaqError {
    /// Name of the channel this error belongs to, when there is one.
    pub fn channel(&self) -> Option<&str> {
        match self {
            DaqError::ChannelUnavailable { channel, .. } => Some(channel),
            DaqError::WorkerPanicked(channel) => Some(channel),
            _ => None,
        }
    }
}
