//! Invocation facade
//!
//! [`Invoker`] calls remote methods on the manager's current connection.
//! Preconditions are checked before anything touches the network and are
//! never retried; the call itself runs under a retry policy that repeats
//! transient failures (3 retries, 500 ms initial delay, doubling).
//!
//! # Preconditions
//!
//! | Situation                          | Error                                  |
//! |------------------------------------|----------------------------------------|
//! | Manager shut down                  | `Error::OutsideScope`                  |
//! | No connection                      | `Error::ConnectionNotEstablished`      |
//! | Connection not `Connected`         | `Error::InvalidState { method, state }` |
//!
//! # Examples
//!
//! ```rust,no_run
//! use tablehub_client::{Invoker, ManagerHandle};
//! use serde_json::json;
//!
//! # async fn example(manager: ManagerHandle) -> tablehub_core::Result<()> {
//! let invoker = Invoker::new(&manager);
//! if invoker.is_connected() {
//!     invoker.invoke("SubscribeToTopic", vec![json!("orders")]).await?;
//! }
//! # Ok(())
//! # }
//! ```

use crate::connection_state::HubConnectionState;
use crate::hub::Hub;
use crate::manager::{read_context, ConnectionContext, ManagerHandle};
use crate::retry::{is_retryable, retry, RetryPolicy};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tablehub_core::{Error, Result};
use tokio::sync::watch;

/// Calls remote methods on the manager's connection
#[derive(Clone)]
pub struct Invoker {
    context: watch::Receiver<ConnectionContext>,
    policy: RetryPolicy,
}

impl Invoker {
    pub fn new(manager: &ManagerHandle) -> Self {
        Self {
            context: manager.subscribe(),
            policy: RetryPolicy::new(3, Duration::from_millis(500), 2.0)
                .with_should_retry(is_retryable::<Error>),
        }
    }

    /// Replace the retry policy
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The manager's current connection
    pub fn connection(&self) -> Option<Arc<dyn Hub>> {
        self.context.borrow().connection.clone()
    }

    /// Whether the manager reports the connection as connected
    pub fn is_connected(&self) -> bool {
        self.context.borrow().is_connected()
    }

    /// Call `method` and wait for it to complete, discarding its result
    pub async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<()> {
        self.invoke_with_result(method, args).await.map(|_| ())
    }

    /// Call `method` and return its result
    ///
    /// # Errors
    ///
    /// A precondition error (see the module docs), or the last failure once
    /// the retry budget is spent, or the first non-transient failure.
    #[tracing::instrument(skip(self, args))]
    pub async fn invoke_with_result(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        let connection = self.ready_connection(method)?;
        retry(|| connection.invoke(method, args.clone()), &self.policy).await
    }

    fn ready_connection(&self, method: &str) -> Result<Arc<dyn Hub>> {
        let context = read_context(&self.context)?;
        let connection = context.connection.ok_or(Error::ConnectionNotEstablished)?;

        let state = connection.state();
        if state != HubConnectionState::Connected {
            return Err(Error::InvalidState {
                method: method.to_string(),
                state: state.to_string(),
            });
        }
        Ok(connection)
    }
}
