use async_trait::async_trait;

use crate::error::Result;
use crate::signaling::ClientSignal;

/// Outbound half of the relay connection.
///
/// Inbound relay messages are not returned from here; implementations push
/// them onto the session queue as `SessionEvent::Signal`, and report a lost
/// connection as `SessionEvent::TransportClosed`.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    async fn send(&self, signal: ClientSignal) -> Result<()>;

    /// Stop delivering and release the connection. Idempotent.
    async fn close(&self);
}
