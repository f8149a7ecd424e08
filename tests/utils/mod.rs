//! Shared harness: sessions wired to an in-process relay and loopback peers.

#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use roomcall::error::{Error, Result};
use roomcall::media::{MediaKind, MediaSource, RemoteTrack, SyntheticMediaSource};
use roomcall::peer::{ConnectionState, LoopbackNetwork};
use roomcall::relay::RoomRegistry;
use roomcall::session::{self, SessionController, SessionHandle, SessionObserver, SessionSettings};
use roomcall::signaling::{ClientSignal, LocalRelayTransport, SignalingTransport};

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One observer callback, flattened for assertions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    LocalLabel(String),
    RemoteLabel(Option<String>),
    StreamAttached(MediaKind),
    StreamDetached,
    Chat(String),
    RoomFull,
    Devices(usize),
    State(ConnectionState),
    Error(String),
}

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Observed>>,
}

impl RecordingObserver {
    fn record(&self, event: Observed) {
        self.events.lock().expect("observer lock").push(event);
    }

    pub fn events(&self) -> Vec<Observed> {
        self.events.lock().expect("observer lock").clone()
    }

    pub fn states(&self) -> Vec<ConnectionState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Observed::State(state) => Some(state),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, event: &Observed) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Observed::Error(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn last_state(&self) -> Option<ConnectionState> {
        self.states().last().copied()
    }

    /// Wait until `check` holds over the recorded events.
    pub async fn wait_for(&self, what: &str, check: impl Fn(&[Observed]) -> bool) {
        let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
        loop {
            if check(&self.events()) {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("Timed out waiting for {}; observed {:?}", what, self.events());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub async fn wait_for_state(&self, state: ConnectionState) {
        self.wait_for(&format!("state {}", state), |events| {
            events.last_state_is(state)
        })
        .await;
    }
}

trait LastState {
    fn last_state_is(&self, state: ConnectionState) -> bool;
}

impl LastState for [Observed] {
    fn last_state_is(&self, state: ConnectionState) -> bool {
        self.iter()
            .rev()
            .find_map(|e| match e {
                Observed::State(s) => Some(*s),
                _ => None,
            })
            == Some(state)
    }
}

impl SessionObserver for RecordingObserver {
    fn on_local_label_ready(&self, label: &str) {
        self.record(Observed::LocalLabel(label.to_string()));
    }

    fn on_remote_label_changed(&self, label: Option<&str>) {
        self.record(Observed::RemoteLabel(label.map(str::to_string)));
    }

    fn on_remote_stream_attached(&self, track: &RemoteTrack) {
        self.record(Observed::StreamAttached(track.kind()));
    }

    fn on_remote_stream_detached(&self) {
        self.record(Observed::StreamDetached);
    }

    fn on_chat_message(&self, text: &str) {
        self.record(Observed::Chat(text.to_string()));
    }

    fn on_room_full(&self) {
        self.record(Observed::RoomFull);
    }

    fn on_devices_enumerated(&self, devices: &[roomcall::media::DeviceInfo]) {
        self.record(Observed::Devices(devices.len()));
    }

    fn on_connection_state(&self, state: ConnectionState) {
        self.record(Observed::State(state));
    }

    fn on_error(&self, error: &Error) {
        self.record(Observed::Error(error.to_string()));
    }
}

/// Relay transport that remembers what was sent
pub struct RecordingTransport {
    inner: LocalRelayTransport,
    sent: Mutex<Vec<ClientSignal>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<ClientSignal> {
        self.sent.lock().expect("transport lock").clone()
    }

    pub fn sent_count(&self, kind: &str) -> usize {
        self.sent().iter().filter(|s| s.kind() == kind).count()
    }
}

#[async_trait]
impl SignalingTransport for RecordingTransport {
    async fn send(&self, signal: ClientSignal) -> Result<()> {
        self.sent.lock().expect("transport lock").push(signal.clone());
        self.inner.send(signal).await
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}

pub struct TestClient {
    pub handle: SessionHandle,
    pub observer: Arc<RecordingObserver>,
    pub transport: Arc<RecordingTransport>,
    task: JoinHandle<()>,
}

impl TestClient {
    pub fn spawn(label: &str, registry: &Arc<RoomRegistry>, network: &LoopbackNetwork) -> Self {
        Self::spawn_with(
            SessionSettings::new(label),
            registry,
            network,
            Arc::new(SyntheticMediaSource::new()),
        )
    }

    pub fn spawn_with(
        settings: SessionSettings,
        registry: &Arc<RoomRegistry>,
        network: &LoopbackNetwork,
        source: Arc<dyn MediaSource>,
    ) -> Self {
        let (tx, rx) = session::channel();
        let transport = Arc::new(RecordingTransport {
            inner: LocalRelayTransport::connect(registry.clone(), tx.clone()),
            sent: Mutex::new(Vec::new()),
        });
        let observer = Arc::new(RecordingObserver::default());

        let (controller, handle) = SessionController::new(
            settings,
            Arc::new(network.clone()),
            transport.clone(),
            source,
            observer.clone(),
            (tx, rx),
        );
        let task = tokio::spawn(controller.run());

        Self {
            handle,
            observer,
            transport,
            task,
        }
    }

    pub fn sent_count(&self, kind: &str) -> usize {
        self.transport.sent_count(kind)
    }

    pub async fn shutdown(self) {
        let _ = self.handle.shutdown();
        let _ = self.task.await;
    }
}

/// Poll an async condition until it holds.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    while !check().await {
        if tokio::time::Instant::now() >= deadline {
            panic!("Timed out waiting for {}", what);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Let queued events drain before asserting that something did not happen.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
