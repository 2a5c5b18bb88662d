//! Acquisition application: N channel workers plus one synchronizer.
//!
//! [`DaqApp`] wires a validated [`Profile`] into running threads. Each channel gets its
//! own queue and worker thread; the synchronizer owns the consumer end of every queue
//! and all sinks. One [`StopSource`] is shared by everything, and [`DaqApp::shutdown`]
//! is the only place threads are joined.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Profile;
use crate::data::{LogSink, RowSink};
use crate::error::{AppResult, DaqError};
use crate::queue::record_queue;
use crate::record::Schema;
use crate::stop::StopSource;
use crate::synchronizer::Synchronizer;
use crate::transport::Connector;
use crate::worker::{ChannelWorker, WorkerStatus};

#[cfg(feature = "storage_csv")]
use crate::data::CsvSink;

/// Name used for the synchronizer in thread names and errors.
pub const SYNCHRONIZER: &str = "synchronizer";

/// Owns one worker thread per channel plus the synchronizer thread, and their stop signal.
pub struct DaqApp {
    profile: Profile,
    stop: StopSource,
    status_tx: Sender<WorkerStatus>,
    status_rx: Receiver<WorkerStatus>,
    workers: Vec<(String, JoinHandle<Result<(), DaqError>>)>,
    synchronizer: Option<JoinHandle<Result<u64, DaqError>>>,
    started: bool,
    rows: u64,
}

impl std::fmt::Debug for DaqApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaqApp")
            .field("channels", &self.profile.channels.len())
            .field("running_workers", &self.workers.len())
            .field("started", &self.started)
            .field("stopped", &self.stop.is_stopped())
            .finish()
    }
}

impl DaqApp {
    /// Validate `profile` and prepare an idle application.
    pub fn new(profile: Profile) -> AppResult<Self> {
        profile.validate()?;
        let (status_tx, status_rx) = unbounded();
        Ok(Self {
            profile,
            stop: StopSource::new(),
            status_tx,
            status_rx,
            workers: Vec::new(),
            synchronizer: None,
            started: false,
            rows: 0,
        })
    }

    /// The validated profile this application runs.
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// CSV header: every channel's fields in channel order.
    pub fn header(&self) -> Vec<String> {
        self.profile
            .channels
            .iter()
            .flat_map(|c| c.fields.iter().cloned())
            .collect()
    }

    /// Worker state changes, for health displays.
    pub fn status(&self) -> Receiver<WorkerStatus> {
        self.status_rx.clone()
    }

    /// Sinks for an unattended run: the CSV log (when enabled) and a console summary.
    pub fn default_sinks(&self) -> Vec<Box<dyn RowSink>> {
        let mut sinks: Vec<Box<dyn RowSink>> = Vec::new();
        #[cfg(feature = "storage_csv")]
        if self.profile.output.enabled {
            sinks.push(Box::new(CsvSink::new(&self.profile.output, self.header())));
        }
        #[cfg(not(feature = "storage_csv"))]
        if self.profile.output.enabled {
            warn!("CSV output requested but the storage_csv feature is disabled");
        }
        let field = self
            .profile
            .channels
            .first()
            .map(|c| c.concentration_field.clone())
            .unwrap_or_else(|| "concentration".to_string());
        sinks.push(Box::new(LogSink::new(field)));
        sinks
    }

    /// Started and not yet stopped.
    pub fn is_running(&self) -> bool {
        self.started && !self.stop.is_stopped()
    }

    /// Spawn one worker per channel and the synchronizer.
    ///
    /// A channel whose port cannot be opened fails on its own thread; the others keep
    /// running and its error is reported by [`DaqApp::shutdown`].
    pub fn start(&mut self, connector: Arc<dyn Connector>, sinks: Vec<Box<dyn RowSink>>) -> AppResult<()> {
        if self.started {
            warn!("Acquisition already started");
            return Ok(());
        }
        self.started = true;

        let mut synchronizer = Synchronizer::new(self.profile.interval());
        for sink in sinks {
            synchronizer.add_sink(sink);
        }

        let channels = self.profile.channels.clone();
        for channel in &channels {
            let (tx, rx) = record_queue(self.profile.queue_bound());
            synchronizer.add_channel(Schema::from_config(channel), rx);
            let worker = ChannelWorker::new(channel.clone(), tx).with_status(self.status_tx.clone());
            match worker.spawn(Arc::clone(&connector), self.stop.token()) {
                Ok(handle) => self.workers.push((channel.name.clone(), handle)),
                Err(e) => {
                    error!(channel = %channel.name, "Failed to spawn worker: {}", e);
                    let _ = self.shutdown();
                    return Err(e);
                }
            }
        }

        match synchronizer.spawn(self.stop.token()) {
            Ok(handle) => self.synchronizer = Some(handle),
            Err(e) => {
                error!("Failed to spawn synchronizer: {}", e);
                let _ = self.shutdown();
                return Err(e);
            }
        }

        info!(
            channels = self.profile.channels.len(),
            interval = ?self.profile.interval(),
            "Acquisition started"
        );
        Ok(())
    }

    /// Stop every thread and wait for it.
    ///
    /// Returns the number of rows produced. Calling it again is a no-op.
    ///
    /// # Errors
    /// [`DaqError::ShutdownFailed`] with one entry per channel that failed or panicked.
    pub fn shutdown(&mut self) -> AppResult<u64> {
        self.stop.stop();
        if self.workers.is_empty() && self.synchronizer.is_none() {
            return Ok(self.rows);
        }
        info!("Shutting down acquisition");

        let mut errors = Vec::new();
        for (name, handle) in self.workers.drain(..) {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => errors.push(e),
                Err(_) => {
                    error!(channel = %name, "Worker thread panicked");
                    errors.push(DaqError::WorkerPanicked(name));
                }
            }
        }
        if let Some(handle) = self.synchronizer.take() {
            match handle.join() {
                Ok(Ok(rows)) => self.rows = rows,
                Ok(Err(e)) => errors.push(e),
                Err(_) => errors.push(DaqError::WorkerPanicked(SYNCHRONIZER.to_string())),
            }
        }

        if errors.is_empty() {
            info!(rows = self.rows, "Acquisition stopped");
            Ok(self.rows)
        } else {
            Err(DaqError::ShutdownFailed(errors))
        }
    }
}

impl Drop for DaqApp {
    fn drop(&mut self) {
        if !self.workers.is_empty() || self.synchronizer.is_some() {
            if let Err(e) = self.shutdown() {
                warn!("Shutdown on drop reported errors: {}", e);
            }
        }
    }
}
