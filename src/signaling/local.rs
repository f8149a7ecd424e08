//! Transport that talks to an in-process [`RoomRegistry`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::Result;
use crate::relay::{ClientHandle, RoomRegistry};
use crate::session::{EventSender, SessionEvent};
use crate::signaling::{ClientSignal, SignalingTransport};

pub struct LocalRelayTransport {
    registry: Arc<RoomRegistry>,
    client: ClientHandle,
    forwarder: JoinHandle<()>,
}

impl LocalRelayTransport {
    /// Register a new connection on `registry`. Must be called inside a
    /// tokio runtime.
    pub fn connect(registry: Arc<RoomRegistry>, events: EventSender) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = ClientHandle::new(Uuid::new_v4().to_string(), tx);

        let forwarder = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if events.send(SessionEvent::Signal(msg)).is_err() {
                    break;
                }
            }
        });

        Self {
            registry,
            client,
            forwarder,
        }
    }

    pub fn conn_id(&self) -> &str {
        &self.client.conn_id
    }
}

#[async_trait]
impl SignalingTransport for LocalRelayTransport {
    async fn send(&self, signal: ClientSignal) -> Result<()> {
        self.registry.handle(&self.client, signal);
        Ok(())
    }

    async fn close(&self) {
        self.registry.disconnect(&self.client.conn_id);
        self.forwarder.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::SignalingMessage;

    #[tokio::test]
    async fn test_relay_messages_reach_the_session_queue() {
        let registry = Arc::new(RoomRegistry::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport = LocalRelayTransport::connect(registry.clone(), tx);

        transport
            .send(ClientSignal::JoinRoom {
                room: "r1@rooms.io".into(),
            })
            .await
            .expect("Should send join");

        match rx.recv().await {
            Some(SessionEvent::Signal(SignalingMessage::RoomAssigned { room })) => {
                assert_eq!(room, "r1@rooms.io");
            }
            other => panic!("Expected room assignment, got {:?}", other),
        }
        assert_eq!(registry.room_of(transport.conn_id()).as_deref(), Some("r1@rooms.io"));

        transport.close().await;
        assert_eq!(registry.room_count(), 0);
    }
}
