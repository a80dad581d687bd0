//! Connection manager
//!
//! The manager owns the single hub connection of the process. It watches the
//! session for credential changes and builds, starts, replaces and tears
//! down the connection accordingly, publishing a [`ConnectionContext`] that
//! the subscription and invocation facades read.
//!
//! # Actor Model
//!
//! All manager state lives in one task. Three kinds of input reach it and
//! are processed strictly one at a time:
//!
//! - **Credential changes** from the session `watch` channel
//! - **Internal events**: lifecycle callbacks of the connection and the
//!   outcome of each start, tagged with the connection's generation
//! - **Commands** from [`ManagerHandle`]s (shutdown)
//!
//! # Generations
//!
//! Every connection the manager builds gets the next generation number.
//! Callbacks and start outcomes carry the generation they belong to; once a
//! connection has been replaced, its late events are discarded, and a start
//! that succeeds after its connection was replaced is stopped again.
//!
//! # Credential Handling
//!
//! | Session                                   | Action                                     |
//! |-------------------------------------------|--------------------------------------------|
//! | No credential                             | Stop and discard any connection, `Disconnect("no access token")` |
//! | Same credential, connection exists        | Nothing                                    |
//! | New credential or no connection           | Stop the old connection, then build and start a new one |
//!
//! # Examples
//!
//! ```rust,no_run
//! use tablehub_client::{
//!     session_channel, ConnectionManager, HubConfig, ManagerConfig, Session, WebSocketHubFactory,
//! };
//!
//! # async fn example() -> tablehub_core::Result<()> {
//! let (session_tx, session_rx) = session_channel(Session::anonymous());
//! let factory = WebSocketHubFactory::new(HubConfig::from_env()?);
//! let manager = ConnectionManager::spawn(ManagerConfig::default(), factory, session_rx);
//!
//! // Login
//! let _ = session_tx.send(Session::new("eyJhbGciOi..."));
//!
//! let context = manager.context()?;
//! println!("connected: {}", context.state.is_connected);
//!
//! // Unmount: a live connection is handed back for graceful shutdown
//! if let Some(connection) = manager.shutdown().await? {
//!     connection.stop().await?;
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::ManagerConfig;
use crate::connection_state::{reduce, ConnectionAction, ConnectionState, HubConnectionState};
use crate::hub::{AccessTokenFactory, Hub, HubFactory};
use crate::retry::retry;
use crate::session::Session;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tablehub_core::{Error, Result};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Reason recorded when the credential disappears
pub const NO_ACCESS_TOKEN: &str = "no access token";
/// Reason recorded when the connection closes without an error
pub const CONNECTION_CLOSED: &str = "connection closed";
/// Reason recorded when reconnecting without an error
pub const RECONNECTING: &str = "reconnecting";

/// Snapshot of the manager's connection and state
#[derive(Clone, Default)]
pub struct ConnectionContext {
    /// The current connection, if any
    pub connection: Option<Arc<dyn Hub>>,
    /// Generation of `connection`; 0 when no connection was ever built
    pub generation: u64,
    pub state: ConnectionState,
}

impl ConnectionContext {
    pub fn is_connected(&self) -> bool {
        self.state.is_connected
    }

    pub fn is_connecting(&self) -> bool {
        self.state.is_connecting
    }

    pub fn error(&self) -> Option<&str> {
        self.state.error.as_deref()
    }

    /// Native state of the current connection
    pub fn connection_state(&self) -> Option<HubConnectionState> {
        self.connection.as_ref().map(|connection| connection.state())
    }
}

impl fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("connection", &self.connection_state())
            .field("generation", &self.generation)
            .field("state", &self.state)
            .finish()
    }
}

enum Command {
    Shutdown {
        reply: oneshot::Sender<Option<Arc<dyn Hub>>>,
    },
}

enum Lifecycle {
    Closed(Option<Error>),
    Reconnecting(Option<Error>),
    Reconnected,
}

enum Event {
    Lifecycle {
        generation: u64,
        lifecycle: Lifecycle,
    },
    StartFinished {
        generation: u64,
        connection: Arc<dyn Hub>,
        result: Result<()>,
    },
}

/// The connection currently owned by the manager
struct Active {
    generation: u64,
    credential: String,
    connection: Arc<dyn Hub>,
    /// Lifecycle handlers are in charge: set when a start begins, cleared
    /// when the start fails or the connection closes
    live: bool,
    /// Set once this connection is replaced or unmounted; no start attempt
    /// begins after it is set
    superseded: Arc<AtomicBool>,
    /// Task running the retried start
    start: JoinHandle<()>,
}

/// Handle to a running connection manager
///
/// Cheaply cloneable. The manager runs until [`ManagerHandle::shutdown`] is
/// called or every handle is dropped.
#[derive(Clone)]
pub struct ManagerHandle {
    commands: mpsc::UnboundedSender<Command>,
    context: watch::Receiver<ConnectionContext>,
}

impl ManagerHandle {
    /// Current connection context
    ///
    /// # Errors
    ///
    /// `Error::OutsideScope` once the manager has shut down.
    pub fn context(&self) -> Result<ConnectionContext> {
        read_context(&self.context)
    }

    /// Receiver that is notified whenever the context changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionContext> {
        self.context.clone()
    }

    /// Stop the manager
    ///
    /// A connection whose handlers are not live is stopped and discarded
    /// (`None`). A live connection is left running and handed back.
    ///
    /// # Errors
    ///
    /// `Error::OutsideScope` if the manager already shut down.
    pub async fn shutdown(&self) -> Result<Option<Arc<dyn Hub>>> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Shutdown { reply })
            .map_err(|_| Error::OutsideScope)?;
        rx.await.map_err(|_| Error::OutsideScope)
    }
}

/// Read a context receiver, failing once its manager is gone
pub(crate) fn read_context(
    context: &watch::Receiver<ConnectionContext>,
) -> Result<ConnectionContext> {
    if context.has_changed().is_err() {
        return Err(Error::OutsideScope);
    }
    Ok(context.borrow().clone())
}

/// The manager actor
pub struct ConnectionManager {
    config: ManagerConfig,
    factory: Arc<dyn HubFactory>,
    credentials: watch::Receiver<Session>,
    credentials_open: bool,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedReceiver<Event>,
    events_tx: mpsc::UnboundedSender<Event>,
    context: watch::Sender<ConnectionContext>,
    active: Option<Active>,
    last_generation: u64,
}

impl ConnectionManager {
    /// Spawn the manager on the current runtime
    pub fn spawn<F>(
        config: ManagerConfig,
        factory: F,
        credentials: watch::Receiver<Session>,
    ) -> ManagerHandle
    where
        F: HubFactory + 'static,
    {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let (context, context_rx) = watch::channel(ConnectionContext::default());

        let manager = Self {
            config,
            factory: Arc::new(factory),
            credentials,
            credentials_open: true,
            commands,
            events,
            events_tx,
            context,
            active: None,
            last_generation: 0,
        };
        tokio::spawn(manager.run());

        ManagerHandle {
            commands: commands_tx,
            context: context_rx,
        }
    }

    async fn run(mut self) {
        self.apply_session().await;

        let reply = loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => break Some(reply),
                    None => break None,
                },
                Some(event) = self.events.recv() => self.handle_event(event).await,
                changed = self.credentials.changed(), if self.credentials_open => match changed {
                    Ok(()) => self.apply_session().await,
                    Err(_) => {
                        tracing::debug!("Session source closed, keeping the current connection");
                        self.credentials_open = false;
                    }
                },
            }
        };

        let handed_back = self.unmount().await;
        let handed_back = match reply {
            Some(reply) => {
                // Close the context before replying so that callers observe
                // the shutdown as soon as `shutdown()` returns
                drop(self);
                let _ = reply.send(handed_back);
                None
            }
            None => handed_back,
        };

        // Nobody is left to take a live connection over
        if let Some(connection) = handed_back {
            stop_quietly(&connection).await;
        }
        tracing::info!("Connection manager stopped");
    }

    async fn apply_session(&mut self) {
        let credential = self
            .credentials
            .borrow_and_update()
            .credential()
            .map(str::to_owned);

        let Some(credential) = credential else {
            if let Some(active) = self.active.take() {
                tracing::info!(generation = active.generation, "Credential removed, stopping connection");
                self.retire(active).await;
            }
            self.dispatch(ConnectionAction::Disconnect(NO_ACCESS_TOKEN.to_string()));
            return;
        };

        if let Some(active) = &self.active {
            if active.credential == credential {
                return;
            }
        }

        if let Some(active) = self.active.take() {
            tracing::info!(generation = active.generation, "Credential changed, replacing connection");
            self.retire(active).await;
            self.dispatch(ConnectionAction::Disconnect(CONNECTION_CLOSED.to_string()));
        }
        self.connect(credential);
    }

    /// Build, register and start a connection for `credential`
    fn connect(&mut self, credential: String) {
        self.last_generation += 1;
        let generation = self.last_generation;

        let source = self.credentials.clone();
        let token_factory: AccessTokenFactory =
            Arc::new(move || source.borrow().token.access_token.clone());
        let connection = self.factory.build(token_factory);
        self.register_lifecycle(&connection, generation);

        let superseded = Arc::new(AtomicBool::new(false));
        self.context.send_modify(|context| {
            context.connection = Some(Arc::clone(&connection));
            context.generation = generation;
        });
        self.dispatch(ConnectionAction::Connecting);
        tracing::info!(generation, "Starting connection");

        let base = self.config.start_retry.clone();
        let policy = base.clone().with_should_retry({
            let superseded = Arc::clone(&superseded);
            move |error| !superseded.load(Ordering::SeqCst) && base.should_retry(error)
        });
        let events = self.events_tx.clone();
        let start = tokio::spawn({
            let connection = Arc::clone(&connection);
            let superseded = Arc::clone(&superseded);
            async move {
                let attempt = || {
                    let connection = Arc::clone(&connection);
                    let superseded = Arc::clone(&superseded);
                    async move {
                        if superseded.load(Ordering::SeqCst) {
                            return Err(Error::Internal("start superseded".to_string()));
                        }
                        connection.start().await
                    }
                };
                let result = retry(attempt, &policy).await;
                let _ = events.send(Event::StartFinished {
                    generation,
                    connection,
                    result,
                });
            }
        });

        self.active = Some(Active {
            generation,
            credential,
            connection,
            live: true,
            superseded,
            start,
        });
    }

    fn register_lifecycle(&self, connection: &Arc<dyn Hub>, generation: u64) {
        let events = self.events_tx.clone();
        connection.on_close(Arc::new(move |error| {
            let _ = events.send(Event::Lifecycle {
                generation,
                lifecycle: Lifecycle::Closed(error),
            });
        }));

        let events = self.events_tx.clone();
        connection.on_reconnecting(Arc::new(move |error| {
            let _ = events.send(Event::Lifecycle {
                generation,
                lifecycle: Lifecycle::Reconnecting(error),
            });
        }));

        let events = self.events_tx.clone();
        connection.on_reconnected(Arc::new(move |_connection_id| {
            let _ = events.send(Event::Lifecycle {
                generation,
                lifecycle: Lifecycle::Reconnected,
            });
        }));
    }

    fn current_mut(&mut self, generation: u64) -> Option<&mut Active> {
        self.active
            .as_mut()
            .filter(|active| active.generation == generation)
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::StartFinished {
                generation,
                connection,
                result,
            } => {
                let Some(active) = self.current_mut(generation) else {
                    tracing::debug!(generation, "Discarding start outcome of a replaced connection");
                    if result.is_ok() {
                        stop_quietly(&connection).await;
                    }
                    return;
                };

                match result {
                    Ok(()) => {
                        tracing::info!(generation, "Connection established");
                        self.dispatch(ConnectionAction::Connected);
                    }
                    Err(error) => {
                        active.live = false;
                        tracing::warn!(generation, error = %error, "Failed to start connection");
                        self.dispatch(ConnectionAction::Error(error.message()));
                    }
                }
            }
            Event::Lifecycle {
                generation,
                lifecycle,
            } => {
                let Some(active) = self.current_mut(generation) else {
                    tracing::debug!(generation, "Discarding lifecycle event of a replaced connection");
                    return;
                };

                match lifecycle {
                    Lifecycle::Closed(error) => {
                        active.live = false;
                        let action = match error {
                            Some(error) => ConnectionAction::Error(error.message()),
                            None => ConnectionAction::Disconnect(CONNECTION_CLOSED.to_string()),
                        };
                        self.dispatch(action);
                    }
                    Lifecycle::Reconnecting(error) => {
                        let message = error
                            .map(|error| error.message())
                            .unwrap_or_else(|| RECONNECTING.to_string());
                        self.dispatch(ConnectionAction::Error(message));
                    }
                    Lifecycle::Reconnected => self.dispatch(ConnectionAction::Connected),
                }
            }
        }
    }

    /// Stop and discard a connection that is being replaced
    async fn retire(&mut self, active: Active) {
        active.superseded.store(true, Ordering::SeqCst);
        // The start task may be sleeping between attempts; it must be gone
        // before the replacement starts
        active.start.abort();
        if let Err(error) = active.start.await {
            if !error.is_cancelled() {
                tracing::warn!(generation = active.generation, error = %error, "Start task ended abnormally");
            }
        }
        stop_quietly(&active.connection).await;
        self.context.send_if_modified(|context| {
            let modified = context.connection.is_some();
            context.connection = None;
            modified
        });
    }

    /// Release the connection at shutdown
    async fn unmount(&mut self) -> Option<Arc<dyn Hub>> {
        let active = self.active.take()?;
        active.superseded.store(true, Ordering::SeqCst);

        if active.live {
            tracing::debug!(generation = active.generation, "Leaving live connection to its handlers");
            Some(active.connection)
        } else {
            stop_quietly(&active.connection).await;
            None
        }
    }

    fn dispatch(&self, action: ConnectionAction) {
        tracing::debug!(action = ?action, "Connection state transition");
        self.context.send_if_modified(|context| {
            let next = reduce(&context.state, action);
            let modified = next != context.state;
            context.state = next;
            modified
        });
    }
}

/// Stop a connection unless it is already disconnected; failures are logged
async fn stop_quietly(connection: &Arc<dyn Hub>) {
    if connection.state() == HubConnectionState::Disconnected {
        return;
    }
    if let Err(error) = connection.stop().await {
        tracing::warn!(error = %error, "Error stopping connection");
    }
}
