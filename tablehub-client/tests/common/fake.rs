//! In-memory hubs for manager and facade tests
//!
//! A [`FakeHub`] behaves like a connection without a socket: `start()` and
//! `invoke()` play back scripted outcomes, and tests raise push events and
//! lifecycle callbacks by hand. Every hub built by one [`FakeFactory`]
//! appends to a shared log, so tests can assert on the order of starts and
//! stops across connection replacements.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tablehub_client::{
    AccessTokenFactory, CloseCallback, EventHandler, EventRegistry, HandlerId, Hub, HubFactory,
    HubConnectionState, LifecycleCallbacks, ReconnectedCallback, ReconnectingCallback,
};
use tablehub_core::{Error, Result};
use tokio::sync::Semaphore;

pub type Log = Arc<Mutex<Vec<String>>>;

/// A hub that never touches the network
pub struct FakeHub {
    /// Credential the hub was built with
    label: String,
    token_factory: AccessTokenFactory,
    state: Mutex<HubConnectionState>,
    start_script: Mutex<VecDeque<Result<()>>>,
    invoke_script: Mutex<VecDeque<Result<Value>>>,
    gate: Option<Semaphore>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    log: Log,
    events: EventRegistry,
    lifecycle: LifecycleCallbacks,
}

impl FakeHub {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Token the manager's factory yields right now
    pub fn current_token(&self) -> String {
        (self.token_factory)()
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Number of `stop()` calls that found the hub not yet disconnected
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.events.handler_count(event)
    }

    /// Let one gated `start()` finish
    pub fn release_start(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    /// Queue outcomes for the next `invoke()` calls
    pub fn script_invokes(&self, outcomes: Vec<Result<Value>>) {
        self.invoke_script.lock().unwrap().extend(outcomes);
    }

    pub fn set_state(&self, state: HubConnectionState) {
        *self.state.lock().unwrap() = state;
    }

    /// Raise a server push event
    pub fn emit(&self, event: &str, args: Vec<Value>) -> usize {
        self.events.dispatch(event, &args)
    }

    /// Simulate a transport drop that the hub recovers from on its own
    pub fn simulate_reconnecting(&self, error: Option<Error>) {
        self.set_state(HubConnectionState::Reconnecting);
        self.lifecycle.fire_reconnecting(error);
    }

    pub fn simulate_reconnected(&self) {
        self.set_state(HubConnectionState::Connected);
        self.lifecycle.fire_reconnected(None);
    }

    /// Simulate the connection closing for good
    pub fn simulate_close(&self, error: Option<Error>) {
        self.set_state(HubConnectionState::Disconnected);
        self.lifecycle.fire_close(error);
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl Hub for FakeHub {
    fn state(&self) -> HubConnectionState {
        *self.state.lock().unwrap()
    }

    async fn start(&self) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if *state != HubConnectionState::Disconnected {
                return Err(Error::InvalidState {
                    method: "start".to_string(),
                    state: state.to_string(),
                });
            }
            *state = HubConnectionState::Connecting;
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.record(format!("start:{}", self.label));

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let outcome = self
            .start_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()));
        let next = match outcome {
            Ok(()) => HubConnectionState::Connected,
            Err(_) => HubConnectionState::Disconnected,
        };
        self.set_state(next);
        outcome
    }

    async fn stop(&self) -> Result<()> {
        let previous = {
            let mut state = self.state.lock().unwrap();
            let previous = *state;
            if previous == HubConnectionState::Disconnected {
                return Ok(());
            }
            *state = HubConnectionState::Disconnected;
            previous
        };
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.record(format!("stop:{}", self.label));

        if matches!(
            previous,
            HubConnectionState::Connected | HubConnectionState::Reconnecting
        ) {
            self.lifecycle.fire_close(None);
        }
        Ok(())
    }

    async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        let state = self.state();
        if state != HubConnectionState::Connected {
            return Err(Error::InvalidState {
                method: method.to_string(),
                state: state.to_string(),
            });
        }
        self.record(format!("invoke:{}:{}", method, Value::Array(args)));

        self.invoke_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Value::Null))
    }

    async fn send(&self, method: &str, args: Vec<Value>) -> Result<()> {
        self.record(format!("send:{}:{}", method, Value::Array(args)));
        Ok(())
    }

    fn on(&self, event: &str, handler: EventHandler) -> HandlerId {
        self.events.register(event, handler)
    }

    fn off(&self, event: &str, id: HandlerId) -> bool {
        self.events.unregister(event, id)
    }

    fn on_close(&self, callback: CloseCallback) {
        self.lifecycle.add_close(callback);
    }

    fn on_reconnecting(&self, callback: ReconnectingCallback) {
        self.lifecycle.add_reconnecting(callback);
    }

    fn on_reconnected(&self, callback: ReconnectedCallback) {
        self.lifecycle.add_reconnected(callback);
    }
}

#[derive(Default)]
struct FactoryState {
    built: Vec<Arc<FakeHub>>,
    start_scripts: VecDeque<Vec<Result<()>>>,
}

/// Builds [`FakeHub`]s and keeps every one it built
#[derive(Clone, Default)]
pub struct FakeFactory {
    state: Arc<Mutex<FactoryState>>,
    log: Log,
    gated: bool,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every `start()` until the test releases it
    pub fn gated() -> Self {
        Self {
            gated: true,
            ..Self::default()
        }
    }

    /// Start outcomes for the next hub built
    pub fn script_next_starts(&self, outcomes: Vec<Result<()>>) {
        self.state.lock().unwrap().start_scripts.push_back(outcomes);
    }

    pub fn built(&self) -> Vec<Arc<FakeHub>> {
        self.state.lock().unwrap().built.clone()
    }

    pub fn built_count(&self) -> usize {
        self.state.lock().unwrap().built.len()
    }

    pub fn hub(&self, index: usize) -> Arc<FakeHub> {
        Arc::clone(&self.state.lock().unwrap().built[index])
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl HubFactory for FakeFactory {
    fn build(&self, access_token_factory: AccessTokenFactory) -> Arc<dyn Hub> {
        let mut state = self.state.lock().unwrap();
        let script = state.start_scripts.pop_front().unwrap_or_default();

        let hub = Arc::new(FakeHub {
            label: access_token_factory(),
            token_factory: access_token_factory,
            state: Mutex::new(HubConnectionState::Disconnected),
            start_script: Mutex::new(script.into()),
            invoke_script: Mutex::new(VecDeque::new()),
            gate: self.gated.then(|| Semaphore::new(0)),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            log: Arc::clone(&self.log),
            events: EventRegistry::new(),
            lifecycle: LifecycleCallbacks::new(),
        });
        state.built.push(Arc::clone(&hub));
        hub
    }
}
