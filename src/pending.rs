//! Pending call table.
//!
//! Tracks every in-flight request on the caller side. Each entry walks a
//! strict lifecycle:
//!
//! ```text
//!             settle()            expire()
//!   Waiting ----------> Settled     |
//!      |                            v
//!      +--------------------------> TimedOut
//! ```
//!
//! Only a `Waiting` entry can transition; a response that arrives after the
//! deadline finds `TimedOut` and is discarded, and a duplicate response finds
//! `Settled` and is discarded. The table never double-delivers.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::protocol::{CallId, WireError};

/// Outcome delivered to a waiting caller.
pub type CallOutcome = std::result::Result<Value, WireError>;

/// Lifecycle state of one outstanding call.
enum CallState {
    /// Caller is parked on the channel.
    Waiting(oneshot::Sender<CallOutcome>),
    /// Deadline elapsed before a response arrived.
    TimedOut,
    /// Outcome was delivered.
    Settled,
}

/// Table of in-flight calls keyed by correlation ID.
#[derive(Default)]
pub struct PendingCalls {
    calls: Mutex<HashMap<CallId, CallState>>,
}

impl PendingCalls {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Register a call and return the channel its outcome will arrive on.
    pub fn register(&self, id: CallId) -> oneshot::Receiver<CallOutcome> {
        let (tx, rx) = oneshot::channel();
        self.calls.lock().insert(id, CallState::Waiting(tx));
        rx
    }

    /// Deliver an outcome to a waiting call.
    ///
    /// Returns `false` if the call is unknown, already settled, or timed
    /// out; the outcome is dropped in that case.
    pub fn settle(&self, id: &CallId, outcome: CallOutcome) -> bool {
        let mut calls = self.calls.lock();
        let Some(state) = calls.get_mut(id) else {
            return false;
        };
        match std::mem::replace(state, CallState::Settled) {
            CallState::Waiting(tx) => {
                // The receiver may already be gone; the call still counts
                // as settled so later responses are discarded.
                let _ = tx.send(outcome);
                true
            }
            previous => {
                *state = previous;
                false
            }
        }
    }

    /// Mark a call as timed out, dropping its waiter.
    ///
    /// Returns `false` if the call is unknown or no longer waiting.
    pub fn expire(&self, id: &CallId) -> bool {
        let mut calls = self.calls.lock();
        let Some(state) = calls.get_mut(id) else {
            return false;
        };
        match std::mem::replace(state, CallState::TimedOut) {
            CallState::Waiting(_) => true,
            previous => {
                *state = previous;
                false
            }
        }
    }

    /// Forget a call entirely.
    pub fn remove(&self, id: &CallId) {
        self.calls.lock().remove(id);
    }

    /// Drop every entry. Waiting callers see their channel close.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    /// Number of tracked calls, in any state.
    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }
}
