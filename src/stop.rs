//! Broadcast stop signal.
//!
//! The source owns the only sender of a zero-capacity channel; stopping drops it, and
//! every token observes the disconnection. Tokens are cheap to clone and double as an
//! interruptible sleep, so a loop waiting for its next tick wakes as soon as the stop
//! is requested instead of finishing the sleep.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Mutex;
use std::time::Duration;

/// Owner side of the stop signal. Stopping is one-way and idempotent.
#[derive(Debug)]
pub struct StopSource {
    sender: Mutex<Option<Sender<()>>>,
    receiver: Receiver<()>,
}

/// Observer side of the stop signal, checked cooperatively at loop boundaries.
#[derive(Debug, Clone)]
pub struct StopToken {
    receiver: Receiver<()>,
}

impl StopSource {
    /// A source that has not fired.
    pub fn new() -> Self {
        let (sender, receiver) = bounded(0);
        Self {
            sender: Mutex::new(Some(sender)),
            receiver,
        }
    }

    /// Hand out a token observing this source.
    pub fn token(&self) -> StopToken {
        StopToken {
            receiver: self.receiver.clone(),
        }
    }

    /// Request every observer to stop. Calling it again is a no-op.
    pub fn stop(&self) {
        match self.sender.lock() {
            Ok(mut guard) => drop(guard.take()),
            Err(poisoned) => drop(poisoned.into_inner().take()),
        }
    }

    /// Whether [`StopSource::stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        self.token().is_stopped()
    }
}

impl Default for StopSource {
    fn default() -> Self {
        Self::new()
    }
}

impl StopToken {
    /// Whether the source has fired. Never blocks.
    pub fn is_stopped(&self) -> bool {
        matches!(self.receiver.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleep for `duration` unless a stop arrives first.
    ///
    /// Returns `true` if the sleep was cut short by a stop.
    pub fn sleep(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return self.is_stopped();
        }
        match self.receiver.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) | Ok(()) => true,
        }
    }
}
