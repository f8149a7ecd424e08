//! WebSocket client for the relay's `/ws` endpoint

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::error::{Error, Result};
use crate::session::{EventSender, SessionEvent};
use crate::signaling::{ClientSignal, SignalingMessage, SignalingTransport};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct WsTransport {
    tx: mpsc::UnboundedSender<Message>,
    receiver: JoinHandle<()>,
}

impl WsTransport {
    /// Connect and start the sender and receiver tasks.
    pub async fn connect(url: &str, events: EventSender) -> Result<Self> {
        tracing::info!(url = %url, "Connecting to relay");

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::Transport(format!("Failed to connect to {}: {}", url, e)))?;

        tracing::info!("Connected to relay");

        let (write, read) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::sender_task(write, rx));
        let receiver = tokio::spawn(Self::receiver_task(read, events));

        Ok(Self { tx, receiver })
    }

    /// Sender task: sends messages from channel to WebSocket
    async fn sender_task(
        mut write: futures::stream::SplitSink<WsStream, Message>,
        mut rx: mpsc::UnboundedReceiver<Message>,
    ) {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if let Err(e) = write.send(msg).await {
                tracing::warn!(error = %e, "Failed to send WebSocket message");
                break;
            }
            if closing {
                break;
            }
        }

        tracing::debug!("Relay sender task terminated");
    }

    /// Receiver task: decodes relay frames onto the session queue
    async fn receiver_task(mut read: futures::stream::SplitStream<WsStream>, events: EventSender) {
        let reason = loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<SignalingMessage>(&text) {
                        Ok(msg) => {
                            if events.send(SessionEvent::Signal(msg)).is_err() {
                                tracing::debug!("Session gone, relay receiver stopping");
                                return;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Malformed relay message dropped");
                        }
                    }
                }
                Some(Ok(Message::Close(_))) => break "relay closed the connection".to_string(),
                Some(Ok(_)) => {}
                Some(Err(e)) => break e.to_string(),
                None => break "relay stream ended".to_string(),
            }
        };

        tracing::info!(reason = %reason, "Relay connection lost");
        let _ = events.send(SessionEvent::TransportClosed(reason));
    }
}

#[async_trait]
impl SignalingTransport for WsTransport {
    async fn send(&self, signal: ClientSignal) -> Result<()> {
        let json = serde_json::to_string(&signal)?;
        self.tx
            .send(Message::Text(json))
            .map_err(|_| Error::Transport("relay connection closed".to_string()))
    }

    async fn close(&self) {
        // A close we initiate is not a lost connection
        self.receiver.abort();
        let _ = self.tx.send(Message::Close(None));
    }
}
