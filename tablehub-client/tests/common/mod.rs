//! Common test utilities for tablehub-client integration tests
//!
//! This module provides a mock hub server that speaks the JSON hub protocol
//! over a real WebSocket, and in-memory fake hubs (see [`fake`]) for driving
//! the connection manager without a network.

#![allow(dead_code)]

pub mod fake;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tablehub_core::{codec, Close, Completion, HubMessage, Invocation};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;

/// Answers a client invocation; `None` leaves it unanswered
pub type InvocationHandler = Arc<dyn Fn(&str, &[Value]) -> Option<Result<Value, String>> + Send + Sync>;

#[derive(Debug, Clone)]
enum Command {
    Push(String),
    Drop,
    Close(Option<String>),
}

/// Mock hub server for client testing
///
/// Accepts any number of connections, completes the handshake, answers
/// invocations through its handler and pushes events on request.
pub struct MockHubServer {
    addr: SocketAddr,
    commands: broadcast::Sender<Command>,
    shutdown_tx: mpsc::Sender<()>,
    invocations: mpsc::UnboundedReceiver<(String, Vec<Value>)>,
    authorization: Arc<Mutex<Vec<Option<String>>>>,
    connections: Arc<AtomicUsize>,
}

impl MockHubServer {
    /// Start a server that answers every invocation with its first argument
    pub async fn new() -> Self {
        Self::with_handler(Arc::new(|_: &str, args: &[Value]| {
            Some(Ok(args.first().cloned().unwrap_or(Value::Null)))
        }))
        .await
    }

    /// Start a server with a custom invocation handler
    pub async fn with_handler(handler: InvocationHandler) -> Self {
        Self::spawn(handler, None).await
    }

    /// Start a server that rejects every handshake with `error`
    pub async fn rejecting_handshake(error: &str) -> Self {
        Self::spawn(Arc::new(|_: &str, _: &[Value]| None), Some(error.to_string())).await
    }

    async fn spawn(handler: InvocationHandler, handshake_error: Option<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (commands, _) = broadcast::channel(64);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (invocations_tx, invocations) = mpsc::unbounded_channel();
        let authorization = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        tokio::spawn({
            let commands = commands.clone();
            let authorization = Arc::clone(&authorization);
            let connections = Arc::clone(&connections);
            async move {
                loop {
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        accepted = listener.accept() => {
                            if let Ok((stream, _)) = accepted {
                                connections.fetch_add(1, Ordering::SeqCst);
                                tokio::spawn(serve(
                                    stream,
                                    Arc::clone(&handler),
                                    handshake_error.clone(),
                                    commands.subscribe(),
                                    invocations_tx.clone(),
                                    Arc::clone(&authorization),
                                ));
                            }
                        }
                    }
                }
            }
        });

        Self {
            addr,
            commands,
            shutdown_tx,
            invocations,
            authorization,
            connections,
        }
    }

    /// The hub URL, with an `http` scheme the way the API reports it
    pub fn url(&self) -> String {
        format!("http://{}/hub/ws-order-table-area", self.addr)
    }

    /// Number of WebSocket connections accepted so far
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// `Authorization` header of each accepted connection, in order
    pub fn authorization_headers(&self) -> Vec<Option<String>> {
        self.authorization.lock().unwrap().clone()
    }

    /// Push an event to every open connection
    pub fn push(&self, event: &str, args: Vec<Value>) {
        let frame = codec::encode(&HubMessage::Invocation(Invocation::send(event, args))).unwrap();
        let _ = self.commands.send(Command::Push(frame));
    }

    /// Drop every open socket without a close frame
    pub fn drop_connections(&self) {
        let _ = self.commands.send(Command::Drop);
    }

    /// Send a hub close record to every open connection
    pub fn close_connections(&self, error: Option<&str>) {
        let _ = self.commands.send(Command::Close(error.map(str::to_owned)));
    }

    /// Wait for the next invocation the server received
    pub async fn next_invocation(&mut self) -> Option<(String, Vec<Value>)> {
        tokio::time::timeout(Duration::from_secs(5), self.invocations.recv())
            .await
            .ok()
            .flatten()
    }

    /// Shutdown the mock server
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.commands.send(Command::Drop);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

async fn serve(
    stream: TcpStream,
    handler: InvocationHandler,
    handshake_error: Option<String>,
    mut commands: broadcast::Receiver<Command>,
    invocations: mpsc::UnboundedSender<(String, Vec<Value>)>,
    authorization: Arc<Mutex<Vec<Option<String>>>>,
) {
    let callback = move |request: &Request, response: Response| {
        let header = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        authorization.lock().unwrap().push(header);
        Ok::<_, ErrorResponse>(response)
    };
    let Ok(socket) = accept_hdr_async(stream, callback).await else {
        return;
    };
    let (mut write, mut read) = socket.split();

    match read.next().await {
        Some(Ok(Message::Text(text))) if text.contains("\"protocol\"") => {}
        _ => return,
    }
    let reply = match &handshake_error {
        Some(error) => json!({ "error": error }).to_string(),
        None => "{}".to_string(),
    };
    if write
        .send(Message::Text(format!("{}\u{1e}", reply)))
        .await
        .is_err()
        || handshake_error.is_some()
    {
        let _ = write.close().await;
        return;
    }

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let Ok(records) = codec::decode_records(&text) else { continue };
                    for record in records {
                        let HubMessage::Invocation(invocation) = record else { continue };
                        let _ = invocations.send((invocation.target.clone(), invocation.arguments.clone()));

                        let Some(id) = invocation.invocation_id else { continue };
                        let Some(outcome) = handler(&invocation.target, &invocation.arguments) else { continue };
                        let completion = match outcome {
                            Ok(result) => Completion::success(id, Some(result)),
                            Err(error) => Completion::failure(id, error),
                        };
                        let frame = codec::encode(&HubMessage::Completion(completion)).unwrap();
                        if write.send(Message::Text(frame)).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            },
            command = commands.recv() => match command {
                Ok(Command::Push(frame)) => {
                    if write.send(Message::Text(frame)).await.is_err() {
                        return;
                    }
                }
                Ok(Command::Close(error)) => {
                    let close = HubMessage::Close(Close { error, allow_reconnect: None });
                    let frame = codec::encode(&close).unwrap();
                    let _ = write.send(Message::Text(frame)).await;
                    let _ = write.close().await;
                    return;
                }
                Ok(Command::Drop) | Err(_) => return,
            }
        }
    }
}

/// Poll `condition` until it holds, panicking after five seconds
pub async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5 seconds"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_url() {
        let server = MockHubServer::new().await;
        assert!(server.url().starts_with("http://127.0.0.1:"));
        assert!(server.url().ends_with("/hub/ws-order-table-area"));
        assert_eq!(server.connection_count(), 0);
        server.shutdown().await;
    }
}
