use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{error::ClientError, types::CallKind};

/// Generation counter distinguishing a currently-relevant call from a
/// stale/superseded one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Epoch(u64);

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tracker for outstanding asynchronous backend calls.
///
/// At most one call per kind may be in flight; a second `begin` of the same
/// kind is rejected rather than superseding the first. Completions are
/// accepted exactly once, and only when they carry the epoch that is still
/// current for their kind — everything else is stale and must be discarded by
/// the caller.
#[derive(Debug, Clone, Default)]
pub struct PendingCalls {
    next_epoch: u64,
    refresh: Option<Epoch>,
    join: Option<Epoch>,
    create: Option<Epoch>,
}

impl PendingCalls {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a call of `kind` as in flight and return its epoch.
    ///
    /// Fails with a stable `call_in_flight` error when a call of the same
    /// kind is already outstanding.
    pub fn begin(&mut self, kind: CallKind) -> Result<Epoch, ClientError> {
        if self.slot(kind).is_some() {
            return Err(ClientError::call_in_flight(kind));
        }

        self.next_epoch += 1;
        let epoch = Epoch(self.next_epoch);
        *self.slot_mut(kind) = Some(epoch);
        Ok(epoch)
    }

    /// Accept a completion for `kind` carrying `epoch`.
    ///
    /// Returns `true` and clears the slot when the epoch is current; returns
    /// `false` for stale or unknown epochs, leaving the tracker untouched.
    pub fn finish(&mut self, kind: CallKind, epoch: Epoch) -> bool {
        if self.slot(kind) == Some(epoch) {
            *self.slot_mut(kind) = None;
            return true;
        }
        false
    }

    /// Abandon the outstanding call of `kind` without a delivery, returning
    /// the abandoned epoch when one was in flight.
    pub fn abandon(&mut self, kind: CallKind) -> Option<Epoch> {
        self.slot_mut(kind).take()
    }

    /// Whether a call of `kind` is currently outstanding.
    pub fn in_flight(&self, kind: CallKind) -> bool {
        self.slot(kind).is_some()
    }

    /// Abandon every outstanding call.
    pub fn clear(&mut self) {
        self.refresh = None;
        self.join = None;
        self.create = None;
    }

    fn slot(&self, kind: CallKind) -> Option<Epoch> {
        match kind {
            CallKind::Refresh => self.refresh,
            CallKind::Join => self.join,
            CallKind::Create => self.create,
        }
    }

    fn slot_mut(&mut self, kind: CallKind) -> &mut Option<Epoch> {
        match kind {
            CallKind::Refresh => &mut self.refresh,
            CallKind::Join => &mut self.join,
            CallKind::Create => &mut self.create,
        }
    }
}
