//! Outstanding-transaction bookkeeping.
//!
//! The table maps transaction ids to waiters. The reactor is its only
//! user; nothing here is synchronized because nothing else may touch it.

use std::collections::HashMap;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::CallError;
use crate::request::Response;

/// Transaction-id class. Control ids are 1..=255, service ids 256..=65535;
/// the ranges are disjoint so the two counters can never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceClass {
    Control,
    Service,
}

impl ServiceClass {
    pub fn of(service_id: u8) -> Self {
        if service_id == 0 {
            Self::Control
        } else {
            Self::Service
        }
    }
}

pub(crate) struct Entry {
    pub reply: oneshot::Sender<Result<Response, CallError>>,
    pub timer: JoinHandle<()>,
}

pub(crate) struct TransactionTable {
    entries: HashMap<u16, Entry>,
    last_ctl: u8,
    last_service: u16,
}

impl TransactionTable {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            last_ctl: 0,
            last_service: 255,
        }
    }

    /// Hand out the next id for the class. Control wraps 255 -> 1 (0 is
    /// reserved), service wraps 65535 -> 256 (the control range below is
    /// off limits). No collision check: the ranges dwarf the number of
    /// in-flight transactions.
    pub fn allocate(&mut self, class: ServiceClass) -> u16 {
        match class {
            ServiceClass::Control => {
                self.last_ctl = match self.last_ctl {
                    u8::MAX => 1,
                    n => n + 1,
                };
                self.last_ctl as u16
            }
            ServiceClass::Service => {
                self.last_service = match self.last_service {
                    u16::MAX => 256,
                    n => n + 1,
                };
                self.last_service
            }
        }
    }

    /// Place an entry. Must happen after `allocate` and before the write is
    /// submitted, so a fast reply always finds its waiter.
    pub fn install(&mut self, id: u16, entry: Entry) {
        let prev = self.entries.insert(id, entry);
        debug_assert!(prev.is_none(), "transaction id {id} reused while in flight");
        if let Some(prev) = prev {
            prev.timer.abort();
        }
    }

    /// Remove an entry without delivering anything; used to roll back after
    /// a failed write.
    pub fn remove(&mut self, id: u16) -> Option<Entry> {
        self.entries.remove(&id)
    }

    /// Deliver a successful response. Returns false if no entry matched
    /// (the caller already timed out or never existed).
    pub fn complete(&mut self, id: u16, response: Response) -> bool {
        match self.entries.remove(&id) {
            Some(entry) => {
                entry.timer.abort();
                if entry.reply.send(Ok(response)).is_err() {
                    tracing::debug!(transaction_id = id, "waiter gone before completion");
                }
                true
            }
            None => false,
        }
    }

    /// Deliver a failure. Same unknown-id semantics as [`Self::complete`].
    pub fn fail(&mut self, id: u16, err: CallError) -> bool {
        match self.entries.remove(&id) {
            Some(entry) => {
                entry.timer.abort();
                if entry.reply.send(Err(err)).is_err() {
                    tracing::debug!(transaction_id = id, "waiter gone before failure");
                }
                true
            }
            None => false,
        }
    }

    /// Timer fire path. The timer task has already finished, so there is
    /// nothing to abort; a stale fire for a completed id is a no-op.
    pub fn expire(&mut self, id: u16) {
        if let Some(entry) = self.entries.remove(&id) {
            tracing::debug!(transaction_id = id, "transaction timed out");
            let _ = entry.reply.send(Err(CallError::Timeout));
        }
    }

    /// Fail every pending waiter and cancel every timer.
    pub fn shutdown(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.timer.abort();
            let _ = entry.reply.send(Err(CallError::Shutdown));
        }
    }

    pub fn pending(&self) -> usize {
        self.entries.len()
    }
}
