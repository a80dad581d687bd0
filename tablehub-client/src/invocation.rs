//! Invocation tracking
//!
//! Correlates outgoing invocations with the completions the server sends
//! back.
//!
//! # Invocation Lifecycle
//!
//! 1. **Generate ID**: Assign a unique invocation id
//! 2. **Register**: Create a oneshot channel for the completion
//! 3. **Send**: Transmit the invocation record
//! 4. **Wait**: Caller awaits the oneshot receiver
//! 5. **Complete**: A completion with the same id arrives and is routed to
//!    the waiting caller, or the connection drops and every pending
//!    invocation fails at once
//!
//! Completions may arrive in any order; ids are unique per connection.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tablehub_core::{Completion, Error, Result};
use tokio::sync::{oneshot, Mutex};

/// Tracker of pending invocations
#[derive(Clone, Default)]
pub struct InvocationTracker {
    pending: Arc<Mutex<HashMap<String, oneshot::Sender<Result<Value>>>>>,
    counter: Arc<AtomicU64>,
}

impl InvocationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a new unique invocation id
    pub fn next_id(&self) -> String {
        self.counter.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Register a pending invocation
    pub async fn register(&self, id: &str) -> oneshot::Receiver<Result<Value>> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.to_string(), tx);
        rx
    }

    /// Route a completion to its caller
    ///
    /// Returns false for a completion nobody is waiting for.
    pub async fn complete(&self, completion: Completion) -> bool {
        let Some(tx) = self.pending.lock().await.remove(&completion.invocation_id) else {
            return false;
        };

        let outcome = match completion.error {
            Some(message) => Err(Error::Hub(message)),
            None => Ok(completion.result.unwrap_or(Value::Null)),
        };
        // The caller may have given up waiting
        let _ = tx.send(outcome);
        true
    }

    /// Fail one pending invocation
    pub async fn fail(&self, id: &str, error: Error) {
        if let Some(tx) = self.pending.lock().await.remove(id) {
            let _ = tx.send(Err(error));
        }
    }

    /// Fail every pending invocation
    pub async fn fail_all(&self, error: Error) {
        let mut pending = self.pending.lock().await;
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(error.clone()));
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}
