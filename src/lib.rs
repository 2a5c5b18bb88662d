//! # CPC DAQ Core Library
//!
//! Scheduled serial acquisition for Condensation Particle Counters. Several instruments
//! are polled concurrently, each on its own thread and its own drift-corrected schedule,
//! and their readings are joined into one row per tick for logging and display.
//!
//! ## Crate Structure
//!
//! - **`scheduler`**: the drift-correcting `next_wake` rule shared by every loop.
//! - **`stop`**: broadcast stop signal observed at loop boundaries.
//! - **`record`**: per-channel `Schema`, immutable `Record`s and the aligned `SyncRow`.
//! - **`queue`**: single-producer/single-consumer record hand-off, bounded with drop-oldest.
//! - **`transport`**: the line-oriented `Transport` seam with serial, simulated and mock
//!   implementations.
//! - **`worker`**: the per-channel state machine (connect, startup, poll, recover, stop).
//! - **`synchronizer`**: fixed-tick row builder that fills silent channels with placeholders.
//! - **`data`**: row sinks, including the CSV log with daily rollover.
//! - **`config`**: YAML instrument profiles (current and legacy layouts) and validation.
//! - **`app`**: `DaqApp`, which owns the threads and shuts them down cleanly.
//! - **`error`**, **`logging`**, **`validation`**: ambient plumbing.

pub mod app;
pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod queue;
pub mod record;
pub mod scheduler;
pub mod stop;
pub mod synchronizer;
pub mod transport;
pub mod validation;
pub mod worker;

pub use app::DaqApp;
pub use config::{ChannelConfig, Profile};
pub use error::{AppResult, DaqError};
pub use record::{Record, SyncRow, Value};
pub use scheduler::{next_wake, Scheduler, WakePlan};
pub use stop::{StopSource, StopToken};
pub use worker::{ChannelWorker, PollOutcome, WorkerState, WorkerStatus};
