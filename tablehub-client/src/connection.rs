//! WebSocket hub connection
//!
//! [`HubConnection`] speaks the JSON hub protocol over a single WebSocket,
//! with negotiation skipped: it opens the socket, performs the handshake and
//! then runs one receive task for the lifetime of the connection.
//!
//! # Connection Lifecycle
//!
//! ```text
//! Disconnected ──start()──▶ Connecting ──handshake──▶ Connected
//!      ▲                                               │    ▲
//!      │ stop() / give up                  connection lost   │ reconnected
//!      │                                               ▼    │
//!      └───────────────────────────────────────── Reconnecting
//! ```
//!
//! # Receive Task
//!
//! The receive task owns the read half of the socket. It:
//!
//! - routes completions to waiting invocations
//! - fans push events out to every registered handler
//! - sends a ping every keep-alive interval
//! - treats `server_timeout` of silence as a lost connection
//! - reconnects per the reconnect policy when the connection drops
//!
//! When the connection drops, every pending invocation fails with
//! `Error::ConnectionClosed`; invocations are never replayed on the new
//! socket.
//!
//! # Authentication
//!
//! The access token factory runs on every connect and reconnect attempt, so
//! a rotated credential is picked up by the next attempt. A non-empty token
//! is sent as `Authorization: Bearer <token>` on the upgrade request.

use crate::connection_state::HubConnectionState;
use crate::events::{EventRegistry, LifecycleCallbacks};
use crate::hub::{
    AccessTokenFactory, CloseCallback, EventHandler, HandlerId, Hub, ReconnectedCallback,
    ReconnectingCallback,
};
use crate::invocation::InvocationTracker;
use crate::metrics::ClientMetrics;
use crate::reconnect::{ReconnectPolicy, RetryContext};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tablehub_core::{codec, Completion, Error, HandshakeRequest, HubMessage, Invocation, Result};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolves once a stop was requested or the stop sender is gone
///
/// The `wait_for` guard must not outlive this call: callers hold the
/// select output across awaits inside spawned tasks.
async fn stop_requested(stop_rx: &mut watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stopped| *stopped).await;
}

/// Rewrite `http(s)://` to `ws(s)://`; other schemes pass through
pub fn websocket_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        url.to_string()
    }
}

fn connect_error(error: tungstenite::Error) -> Error {
    match error {
        tungstenite::Error::Http(response) => {
            Error::Handshake(format!("HTTP {}", response.status()))
        }
        other => Error::WebSocket(other.to_string()),
    }
}

/// Everything a connection is built from
pub(crate) struct HubOptions {
    pub url: String,
    pub access_token_factory: Option<AccessTokenFactory>,
    pub reconnect_policy: Option<Box<dyn ReconnectPolicy>>,
    pub keep_alive_interval: Duration,
    pub server_timeout: Duration,
    pub handshake_timeout: Duration,
    pub metrics: Option<Arc<ClientMetrics>>,
}

/// Hub connection over WebSocket
///
/// Cheaply cloneable; all clones share the same connection. Built with
/// [`crate::HubConnectionBuilder`].
#[derive(Clone)]
pub struct HubConnection {
    inner: Arc<Inner>,
}

/// Stop signal and receive task of one started connection
struct Run {
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

enum Exit {
    Stopped,
    Lost {
        error: Option<Error>,
        allow_reconnect: bool,
    },
}

struct Inner {
    url: String,
    access_token_factory: Option<AccessTokenFactory>,
    reconnect_policy: Option<Mutex<Box<dyn ReconnectPolicy>>>,
    keep_alive_interval: Duration,
    server_timeout: Duration,
    handshake_timeout: Duration,
    metrics: Option<Arc<ClientMetrics>>,
    state: Mutex<HubConnectionState>,
    sender: tokio::sync::Mutex<Option<WsSink>>,
    invocations: InvocationTracker,
    events: EventRegistry,
    lifecycle: LifecycleCallbacks,
    run: Mutex<Option<Run>>,
}

impl HubConnection {
    pub(crate) fn new(options: HubOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                url: options.url,
                access_token_factory: options.access_token_factory,
                reconnect_policy: options.reconnect_policy.map(Mutex::new),
                keep_alive_interval: options.keep_alive_interval,
                server_timeout: options.server_timeout,
                handshake_timeout: options.handshake_timeout,
                metrics: options.metrics,
                state: Mutex::new(HubConnectionState::Disconnected),
                sender: tokio::sync::Mutex::new(None),
                invocations: InvocationTracker::new(),
                events: EventRegistry::new(),
                lifecycle: LifecycleCallbacks::new(),
                run: Mutex::new(None),
            }),
        }
    }

    /// The configured hub URL, before scheme rewriting
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Number of handlers registered for `event`
    pub fn handler_count(&self, event: &str) -> usize {
        self.inner.events.handler_count(event)
    }

    fn ensure_connected(&self, method: &str) -> Result<()> {
        let state = self.inner.state();
        if state != HubConnectionState::Connected {
            return Err(Error::InvalidState {
                method: method.to_string(),
                state: state.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Hub for HubConnection {
    fn state(&self) -> HubConnectionState {
        self.inner.state()
    }

    #[tracing::instrument(skip(self), fields(url = %self.inner.url))]
    async fn start(&self) -> Result<()> {
        if !self
            .inner
            .transition(HubConnectionState::Disconnected, HubConnectionState::Connecting)
        {
            return Err(Error::InvalidState {
                method: "start".to_string(),
                state: self.inner.state().to_string(),
            });
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        *lock(&self.inner.run) = Some(Run {
            stop: stop_tx,
            task: None,
        });

        tracing::info!("Starting connection");
        let opened = tokio::select! {
            opened = self.inner.open() => opened,
            _ = stop_requested(&mut stop_rx) => {
                Err(Error::Internal("The connection was stopped during start".to_string()))
            }
        };

        let (sink, source, pending) = match opened {
            Ok(parts) => parts,
            Err(error) => {
                tracing::warn!(error = %error, "Failed to start connection");
                self.inner.record_error("start");
                if self
                    .inner
                    .transition(HubConnectionState::Connecting, HubConnectionState::Disconnected)
                {
                    lock(&self.inner.run).take();
                }
                return Err(error);
            }
        };

        *self.inner.sender.lock().await = Some(sink);
        if !self
            .inner
            .transition(HubConnectionState::Connecting, HubConnectionState::Connected)
        {
            self.inner.close_sink().await;
            return Err(Error::Internal(
                "The connection was stopped during start".to_string(),
            ));
        }

        let task = tokio::spawn(receive_loop(Arc::clone(&self.inner), source, stop_rx, pending));
        match lock(&self.inner.run).as_mut() {
            Some(run) => run.task = Some(task),
            // Already stopped; the task observes the stop signal and exits
            None => drop(task),
        }

        tracing::info!("Connection started");
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(url = %self.inner.url))]
    async fn stop(&self) -> Result<()> {
        let previous = {
            let mut state = lock(&self.inner.state);
            let current = *state;
            match current {
                HubConnectionState::Disconnected | HubConnectionState::Disconnecting => {
                    return Ok(())
                }
                _ => {
                    *state = HubConnectionState::Disconnecting;
                    current
                }
            }
        };
        self.inner.update_metrics_state(HubConnectionState::Disconnecting);

        let task = lock(&self.inner.run).take().and_then(|run| {
            let _ = run.stop.send(true);
            run.task
        });

        self.inner.close_sink().await;
        if let Some(task) = task {
            if let Err(error) = task.await {
                tracing::warn!(error = %error, "Receive task ended abnormally");
            }
        }
        self.inner.invocations.fail_all(Error::ConnectionClosed).await;
        self.inner.set_state(HubConnectionState::Disconnected);

        tracing::info!(previous = %previous, "Connection stopped");
        if matches!(
            previous,
            HubConnectionState::Connected | HubConnectionState::Reconnecting
        ) {
            self.inner.lifecycle.fire_close(None);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, args))]
    async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.ensure_connected(method)?;
        let started = std::time::Instant::now();

        let id = self.inner.invocations.next_id();
        let rx = self.inner.invocations.register(&id).await;

        let message = HubMessage::Invocation(Invocation::call(id.clone(), method, args));
        if let Err(error) = self.inner.send_message(&message).await {
            self.inner.invocations.fail(&id, error.clone()).await;
            self.inner.record_error("send");
            return Err(error);
        }
        tracing::debug!(invocation_id = %id, "Invocation sent, waiting for completion");

        let outcome = rx.await.map_err(|_| Error::ConnectionClosed)?;

        if let Some(metrics) = &self.inner.metrics {
            let status = if outcome.is_ok() { "success" } else { "error" };
            metrics.record_invocation(method, status, started.elapsed().as_secs_f64());
        }
        if let Err(error) = &outcome {
            tracing::debug!(error = %error, "Invocation failed");
        }
        outcome
    }

    #[tracing::instrument(skip(self, args))]
    async fn send(&self, method: &str, args: Vec<Value>) -> Result<()> {
        self.ensure_connected(method)?;
        self.inner
            .send_message(&HubMessage::Invocation(Invocation::send(method, args)))
            .await
    }

    fn on(&self, event: &str, handler: EventHandler) -> HandlerId {
        self.inner.events.register(event, handler)
    }

    fn off(&self, event: &str, id: HandlerId) -> bool {
        self.inner.events.unregister(event, id)
    }

    fn on_close(&self, callback: CloseCallback) {
        self.inner.lifecycle.add_close(callback);
    }

    fn on_reconnecting(&self, callback: ReconnectingCallback) {
        self.inner.lifecycle.add_reconnecting(callback);
    }

    fn on_reconnected(&self, callback: ReconnectedCallback) {
        self.inner.lifecycle.add_reconnected(callback);
    }
}

impl Inner {
    fn state(&self) -> HubConnectionState {
        *lock(&self.state)
    }

    fn set_state(&self, state: HubConnectionState) {
        *lock(&self.state) = state;
        self.update_metrics_state(state);
    }

    /// Compare-and-set on the native state
    fn transition(&self, from: HubConnectionState, to: HubConnectionState) -> bool {
        {
            let mut state = lock(&self.state);
            if *state != from {
                return false;
            }
            *state = to;
        }
        self.update_metrics_state(to);
        true
    }

    fn update_metrics_state(&self, state: HubConnectionState) {
        if let Some(metrics) = &self.metrics {
            metrics.update_connection_state(state);
        }
    }

    fn record_error(&self, kind: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_error(kind);
        }
    }

    /// Open the socket and complete the handshake
    ///
    /// Returns the split socket and any records that arrived in the same
    /// frame as the handshake response.
    async fn open(&self) -> Result<(WsSink, WsSource, Vec<HubMessage>)> {
        let mut request = websocket_url(&self.url)
            .into_client_request()
            .map_err(|e| Error::WebSocket(e.to_string()))?;

        if let Some(factory) = &self.access_token_factory {
            let token = factory();
            if !token.is_empty() {
                let value = HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| Error::Handshake(format!("invalid access token: {}", e)))?;
                request.headers_mut().insert(AUTHORIZATION, value);
            }
        }

        let (stream, _response) = connect_async(request).await.map_err(connect_error)?;
        let (mut sink, mut source) = stream.split();

        let handshake = codec::encode_handshake(&HandshakeRequest::default())?;
        sink.send(Message::Text(handshake))
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;

        let frame = tokio::time::timeout(self.handshake_timeout, read_text(&mut source))
            .await
            .map_err(|_| {
                Error::Handshake(
                    "Server timeout elapsed while waiting for the handshake response".to_string(),
                )
            })??;

        let (response, rest) = codec::decode_handshake_response(&frame)?;
        if let Some(error) = response.error {
            return Err(Error::Handshake(error));
        }
        let pending = codec::decode_records(rest)?;

        tracing::debug!("Handshake completed");
        Ok((sink, source, pending))
    }

    async fn send_message(&self, message: &HubMessage) -> Result<()> {
        let frame = codec::encode(message)?;
        let mut sender = self.sender.lock().await;
        let sink = sender.as_mut().ok_or(Error::ConnectionClosed)?;
        sink.send(Message::Text(frame))
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))
    }

    /// Take the write half and close it; failures are logged
    async fn close_sink(&self) {
        let sink = self.sender.lock().await.take();
        if let Some(mut sink) = sink {
            if let Err(error) = sink.close().await {
                tracing::debug!(error = %error, "Error closing socket");
            }
        }
    }

    /// Process frames until the connection is stopped or lost
    async fn receive(
        &self,
        source: &mut WsSource,
        stop_rx: &mut watch::Receiver<bool>,
        pending: Vec<HubMessage>,
    ) -> Exit {
        for message in pending {
            if let Some(exit) = self.handle_message(message).await {
                return exit;
            }
        }

        let mut keep_alive = tokio::time::interval_at(
            Instant::now() + self.keep_alive_interval,
            self.keep_alive_interval,
        );
        keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let server_timeout = tokio::time::sleep(self.server_timeout);
        tokio::pin!(server_timeout);

        loop {
            tokio::select! {
                _ = stop_requested(stop_rx) => return Exit::Stopped,
                _ = &mut server_timeout => {
                    tracing::warn!(timeout_secs = self.server_timeout.as_secs_f64(), "Server timeout elapsed");
                    return Exit::Lost { error: Some(Error::Timeout), allow_reconnect: true };
                }
                _ = keep_alive.tick() => {
                    if let Err(error) = self.send_message(&HubMessage::Ping).await {
                        tracing::debug!(error = %error, "Failed to send keep-alive ping");
                    }
                }
                frame = source.next() => {
                    server_timeout.as_mut().reset(Instant::now() + self.server_timeout);

                    match frame {
                        Some(Ok(Message::Text(text))) => match codec::decode_records(&text) {
                            Ok(messages) => {
                                for message in messages {
                                    if let Some(exit) = self.handle_message(message).await {
                                        return exit;
                                    }
                                }
                            }
                            Err(error) => {
                                tracing::warn!(error = %error, "Dropping undecodable frame");
                                self.record_error("protocol");
                            }
                        },
                        Some(Ok(Message::Close(frame))) => {
                            let error = match frame {
                                Some(frame) if frame.code != CloseCode::Normal => Some(Error::WebSocket(format!(
                                    "WebSocket closed with status code: {} ({})",
                                    u16::from(frame.code),
                                    frame.reason
                                ))),
                                _ => None,
                            };
                            tracing::info!("Connection closed by server");
                            return Exit::Lost { error, allow_reconnect: true };
                        }
                        Some(Ok(_)) => {}
                        Some(Err(error)) => {
                            tracing::warn!(error = %error, "WebSocket error");
                            self.record_error("websocket");
                            return Exit::Lost {
                                error: Some(Error::WebSocket(error.to_string())),
                                allow_reconnect: true,
                            };
                        }
                        None => {
                            return Exit::Lost {
                                error: Some(Error::WebSocket(
                                    "connection closed without a close frame".to_string(),
                                )),
                                allow_reconnect: true,
                            };
                        }
                    }
                }
            }
        }
    }

    async fn handle_message(&self, message: HubMessage) -> Option<Exit> {
        match message {
            HubMessage::Invocation(invocation) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_event(&invocation.target);
                }
                tracing::debug!(event = %invocation.target, "Event received");
                self.events
                    .dispatch(&invocation.target, &invocation.arguments);

                // Server-to-client calls that expect a result are not supported
                if let Some(id) = invocation.invocation_id {
                    let reply = HubMessage::Completion(Completion::failure(
                        id,
                        "Client didn't provide a result.",
                    ));
                    if let Err(error) = self.send_message(&reply).await {
                        tracing::debug!(error = %error, "Failed to reject server invocation");
                    }
                }
                None
            }
            HubMessage::Completion(completion) => {
                let id = completion.invocation_id.clone();
                if !self.invocations.complete(completion).await {
                    tracing::debug!(invocation_id = %id, "Completion for unknown invocation");
                }
                None
            }
            HubMessage::Ping => None,
            HubMessage::Close(close) => {
                tracing::info!(error = ?close.error, allow_reconnect = ?close.allow_reconnect, "Server closed the connection");
                let error = close
                    .error
                    .map(|message| Error::Hub(format!("Server returned an error on close: {}", message)));
                Some(Exit::Lost {
                    error,
                    allow_reconnect: close.allow_reconnect.unwrap_or(false),
                })
            }
            HubMessage::Other(kind) => {
                tracing::debug!(kind, "Ignoring unsupported hub record");
                None
            }
        }
    }

    /// Reconnect per the policy
    ///
    /// Returns the new read half, or `None` when stopped or the policy gave
    /// up; giving up closes the connection.
    async fn reconnect(
        &self,
        reason: Option<Error>,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> Option<(WsSource, Vec<HubMessage>)> {
        let policy = self.reconnect_policy.as_ref()?;
        if !self.transition(HubConnectionState::Connected, HubConnectionState::Reconnecting) {
            return None;
        }

        tracing::info!(reason = ?reason.as_ref().map(Error::message), "Connection lost, reconnecting");
        self.lifecycle.fire_reconnecting(reason.clone());

        let started = Instant::now();
        let mut previous_retry_count: u32 = 0;
        let mut last_error = reason;

        loop {
            let context = RetryContext {
                previous_retry_count,
                elapsed: started.elapsed(),
                reason: last_error.clone(),
            };
            let next = lock(policy).next_delay(&context);

            let Some(delay) = next else {
                tracing::warn!(attempts = previous_retry_count, "Reconnect attempts exhausted");
                if self.transition(HubConnectionState::Reconnecting, HubConnectionState::Disconnected) {
                    self.lifecycle.fire_close(last_error);
                }
                return None;
            };

            tracing::info!(
                delay_secs = delay.as_secs_f64(),
                attempt = previous_retry_count + 1,
                "Reconnecting"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stop_requested(stop_rx) => return None,
            }
            if self.state() != HubConnectionState::Reconnecting {
                return None;
            }

            if let Some(metrics) = &self.metrics {
                metrics.record_reconnect_attempt();
            }
            let attempt = tokio::select! {
                opened = self.open() => opened,
                _ = stop_requested(stop_rx) => return None,
            };

            match attempt {
                Ok((sink, source, pending)) => {
                    *self.sender.lock().await = Some(sink);
                    if !self.transition(HubConnectionState::Reconnecting, HubConnectionState::Connected) {
                        self.close_sink().await;
                        return None;
                    }
                    lock(policy).reset();
                    if let Some(metrics) = &self.metrics {
                        metrics.record_reconnect_success();
                    }

                    tracing::info!(attempts = previous_retry_count + 1, "Reconnected");
                    self.lifecycle.fire_reconnected(None);
                    return Some((source, pending));
                }
                Err(error) => {
                    tracing::warn!(error = %error, "Reconnect attempt failed");
                    self.record_error("reconnect");
                    previous_retry_count += 1;
                    last_error = Some(error);
                }
            }
        }
    }
}

async fn read_text(source: &mut WsSource) -> Result<String> {
    loop {
        match source.next().await {
            Some(Ok(Message::Text(text))) => return Ok(text),
            Some(Ok(Message::Close(_))) | None => {
                return Err(Error::Handshake(
                    "connection closed before the handshake completed".to_string(),
                ))
            }
            Some(Ok(_)) => continue,
            Some(Err(error)) => return Err(Error::WebSocket(error.to_string())),
        }
    }
}

async fn receive_loop(
    inner: Arc<Inner>,
    mut source: WsSource,
    mut stop_rx: watch::Receiver<bool>,
    mut pending: Vec<HubMessage>,
) {
    loop {
        let exit = inner
            .receive(&mut source, &mut stop_rx, std::mem::take(&mut pending))
            .await;

        let (error, allow_reconnect) = match exit {
            Exit::Stopped => return,
            Exit::Lost {
                error,
                allow_reconnect,
            } => (error, allow_reconnect),
        };

        inner.sender.lock().await.take();
        inner.invocations.fail_all(Error::ConnectionClosed).await;

        if allow_reconnect && inner.reconnect_policy.is_some() {
            match inner.reconnect(error, &mut stop_rx).await {
                Some((next_source, next_pending)) => {
                    source = next_source;
                    pending = next_pending;
                }
                None => return,
            }
        } else {
            if inner.transition(HubConnectionState::Connected, HubConnectionState::Disconnected) {
                tracing::info!(error = ?error.as_ref().map(Error::message), "Connection closed");
                inner.lifecycle.fire_close(error);
            }
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_requested_across_awaits_in_spawned_task() {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let (ticks_tx, mut ticks) = tokio::sync::mpsc::unbounded_channel();

        // Selecting on the stop signal and awaiting inside the loop must
        // still yield a future that can be spawned
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(5));
            loop {
                tokio::select! {
                    _ = stop_requested(&mut stop_rx) => return "stopped",
                    _ = interval.tick() => {
                        tokio::task::yield_now().await;
                        let _ = ticks_tx.send(());
                    }
                }
            }
        });

        ticks.recv().await.unwrap();
        stop_tx.send(true).unwrap();
        assert_eq!(task.await.unwrap(), "stopped");
    }

    #[tokio::test]
    async fn test_stop_requested_when_sender_dropped() {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        drop(stop_tx);
        tokio::time::timeout(Duration::from_secs(1), stop_requested(&mut stop_rx))
            .await
            .unwrap();
    }

    fn options(url: &str) -> HubOptions {
        HubOptions {
            url: url.to_string(),
            access_token_factory: None,
            reconnect_policy: None,
            keep_alive_interval: Duration::from_secs(15),
            server_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(15),
            metrics: None,
        }
    }

    #[test]
    fn test_websocket_url() {
        assert_eq!(
            websocket_url("https://pos.example.com/hub/ws-order-table-area"),
            "wss://pos.example.com/hub/ws-order-table-area"
        );
        assert_eq!(websocket_url("http://localhost:5000/hub"), "ws://localhost:5000/hub");
        assert_eq!(websocket_url("ws://localhost:5000/hub"), "ws://localhost:5000/hub");
    }

    #[tokio::test]
    async fn test_new_connection_is_disconnected() {
        let hub = HubConnection::new(options("ws://127.0.0.1:1/hub"));
        assert_eq!(hub.state(), HubConnectionState::Disconnected);
        // Stopping a disconnected connection is a no-op
        assert!(hub.stop().await.is_ok());
    }

    #[tokio::test]
    async fn test_invoke_requires_connected() {
        let hub = HubConnection::new(options("ws://127.0.0.1:1/hub"));

        let error = hub.invoke("JoinTable", vec![12.into()]).await.unwrap_err();
        assert_eq!(
            error,
            Error::InvalidState {
                method: "JoinTable".into(),
                state: "Disconnected".into()
            }
        );
        assert!(hub.send("LeaveTable", vec![12.into()]).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_start_returns_to_disconnected() {
        // Nothing listens on port 1
        let hub = HubConnection::new(options("ws://127.0.0.1:1/hub"));

        let error = hub.start().await.unwrap_err();
        assert!(matches!(error, Error::WebSocket(_)));
        assert_eq!(hub.state(), HubConnectionState::Disconnected);
    }

    #[test]
    fn test_handlers_register_and_remove() {
        let hub = HubConnection::new(options("ws://127.0.0.1:1/hub"));
        let id = hub.on("DishesUpdated", Arc::new(|_: &[Value]| {}));
        assert_eq!(hub.handler_count("dishesupdated"), 1);

        assert!(hub.off("DishesUpdated", id));
        assert_eq!(hub.handler_count("DishesUpdated"), 0);
    }

    #[test]
    fn test_http_rejection_is_handshake_error() {
        let response = tungstenite::http::Response::builder()
            .status(401)
            .body(None)
            .unwrap();
        let error = connect_error(tungstenite::Error::Http(response));

        assert_eq!(error, Error::Handshake("HTTP 401 Unauthorized".into()));
        assert!(!crate::retry::is_retryable(&error));
    }
}
