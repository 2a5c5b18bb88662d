//! Per-channel record queue.
//!
//! Exactly one worker pushes and exactly one synchronizer pops. Pushing never blocks:
//! a bounded queue evicts its oldest record to make room, since consumers only care
//! about the freshest reading.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};

use crate::record::Record;

/// Create a queue holding at most `bound` records, or any number when `None`.
pub fn record_queue(bound: Option<usize>) -> (RecordSender, RecordReceiver) {
    let (sender, receiver) = match bound {
        Some(capacity) => bounded(capacity.max(1)),
        None => unbounded(),
    };
    (
        RecordSender {
            sender,
            evict: receiver.clone(),
        },
        RecordReceiver { receiver },
    )
}

/// Producer end, owned by a channel worker.
#[derive(Debug)]
pub struct RecordSender {
    sender: Sender<Record>,
    // Producer-side handle used only to discard the oldest entry when full.
    evict: Receiver<Record>,
}

impl RecordSender {
    /// Enqueue `record`, returning how many older records were dropped for it.
    pub fn push(&self, record: Record) -> usize {
        let mut dropped = 0;
        let mut pending = record;
        loop {
            match self.sender.try_send(pending) {
                Ok(()) => return dropped,
                Err(TrySendError::Full(back)) => {
                    if self.evict.try_recv().is_ok() {
                        dropped += 1;
                    }
                    pending = back;
                }
                // Unreachable while `evict` is alive; nothing to deliver to.
                Err(TrySendError::Disconnected(_)) => return dropped,
            }
        }
    }

    /// Bound, `None` when unbounded.
    pub fn capacity(&self) -> Option<usize> {
        self.sender.capacity()
    }
}

/// Consumer end, owned by the synchronizer.
#[derive(Debug)]
pub struct RecordReceiver {
    receiver: Receiver<Record>,
}

impl RecordReceiver {
    /// Take the oldest queued record without waiting.
    pub fn try_next(&self) -> Option<Record> {
        self.receiver.try_recv().ok()
    }

    /// Records waiting.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// No records waiting.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
