use std::sync::Arc;

use crate::peer::DataLink;

/// Label of the one text channel a session carries
pub const CHAT_CHANNEL_LABEL: &str = "chat";

/// Which side opened the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrigin {
    Local,
    Remote,
}

/// Chat sub-channel of a peer session.
///
/// Sending is fire-and-forget: a message that cannot be handed to the
/// transport is logged and lost. Inbound messages do not pass through here;
/// they arrive on the session queue as link events.
pub struct DataChannelBridge {
    link: Arc<dyn DataLink>,
    origin: ChannelOrigin,
}

impl DataChannelBridge {
    /// Channel created by this side before its offer
    pub fn local(link: Arc<dyn DataLink>) -> Self {
        Self {
            link,
            origin: ChannelOrigin::Local,
        }
    }

    /// Channel captured from the remote side's offer
    pub fn remote(link: Arc<dyn DataLink>) -> Self {
        Self {
            link,
            origin: ChannelOrigin::Remote,
        }
    }

    pub fn label(&self) -> &str {
        self.link.label()
    }

    pub fn origin(&self) -> ChannelOrigin {
        self.origin
    }

    /// Returns whether the text was handed to the transport.
    pub async fn send(&self, text: &str) -> bool {
        match self.link.send_text(text).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(label = %self.label(), error = %e, "Chat message not sent");
                false
            }
        }
    }

    pub async fn close(&self) {
        if let Err(e) = self.link.close().await {
            tracing::debug!(label = %self.label(), error = %e, "Error closing data channel");
        }
    }
}
