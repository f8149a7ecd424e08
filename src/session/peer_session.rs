use std::sync::Arc;

use crate::media::RemoteTrack;
use crate::peer::{ConnectionManager, DataChannelBridge, DataLink};

/// Which side of the offer/answer exchange this client is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationRole {
    Idle,
    Offering,
    Answering,
    Connected,
}

/// What a reset released, so the caller can tell the UI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleasedPeer {
    pub remote_media: bool,
    pub remote_label: bool,
}

/// The one ongoing connection to the remote party, plus what the UI shows
/// of it.
pub struct PeerSession {
    manager: ConnectionManager,
    role: NegotiationRole,
    remote_label: Option<String>,
    remote_tracks: Vec<RemoteTrack>,
    channel: Option<DataChannelBridge>,
    awaiting_inbound_channel: bool,
}

impl PeerSession {
    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            manager,
            role: NegotiationRole::Idle,
            remote_label: None,
            remote_tracks: Vec::new(),
            channel: None,
            awaiting_inbound_channel: false,
        }
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut ConnectionManager {
        &mut self.manager
    }

    pub fn role(&self) -> NegotiationRole {
        self.role
    }

    pub fn set_role(&mut self, role: NegotiationRole) {
        if self.role != role {
            tracing::debug!(from = ?self.role, to = ?role, "Negotiation role changed");
            self.role = role;
        }
    }

    pub fn remote_label(&self) -> Option<&str> {
        self.remote_label.as_deref()
    }

    /// Returns whether the label changed
    pub fn set_remote_label(&mut self, label: Option<String>) -> bool {
        if self.remote_label == label {
            return false;
        }
        self.remote_label = label;
        true
    }

    /// Returns false for a track already attached
    pub fn attach_remote_track(&mut self, track: RemoteTrack) -> bool {
        if self.remote_tracks.iter().any(|t| t.id() == track.id()) {
            return false;
        }
        self.remote_tracks.push(track);
        true
    }

    pub fn remote_tracks(&self) -> &[RemoteTrack] {
        &self.remote_tracks
    }

    pub fn attach_channel(&mut self, channel: DataChannelBridge) {
        self.channel = Some(channel);
    }

    /// Expect exactly one channel from the remote offer.
    pub fn arm_inbound_channel(&mut self) {
        self.awaiting_inbound_channel = true;
    }

    /// Take the inbound channel if one is expected; later ones are refused.
    pub fn capture_inbound_channel(&mut self, link: Arc<dyn DataLink>) -> bool {
        if !self.awaiting_inbound_channel || self.channel.is_some() {
            return false;
        }
        self.awaiting_inbound_channel = false;
        self.channel = Some(DataChannelBridge::remote(link));
        true
    }

    pub fn channel(&self) -> Option<&DataChannelBridge> {
        self.channel.as_ref()
    }

    /// Close the channel, stop remote media, forget the remote party and tear
    /// the connection down.
    pub async fn reset(&mut self) -> ReleasedPeer {
        if let Some(channel) = self.channel.take() {
            channel.close().await;
        }

        let remote_media = !self.remote_tracks.is_empty();
        for track in self.remote_tracks.drain(..) {
            track.stop();
        }
        let remote_label = self.remote_label.take().is_some();

        self.role = NegotiationRole::Idle;
        self.awaiting_inbound_channel = false;
        self.manager.teardown().await;

        ReleasedPeer {
            remote_media,
            remote_label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaKind;
    use crate::peer::LoopbackNetwork;
    use tokio::sync::mpsc;

    fn session() -> PeerSession {
        let (tx, _rx) = mpsc::unbounded_channel();
        PeerSession::new(ConnectionManager::new(Arc::new(LoopbackNetwork::new()), tx))
    }

    #[tokio::test]
    async fn test_reset_stops_remote_media() {
        let mut peer = session();
        let track = RemoteTrack::new("video-1", MediaKind::Video, "remote");
        let display = track.clone();

        assert!(peer.attach_remote_track(track.clone()));
        assert!(!peer.attach_remote_track(track));
        assert!(peer.set_remote_label(Some("bob@example.com".into())));
        peer.set_role(NegotiationRole::Connected);

        let released = peer.reset().await;
        assert_eq!(
            released,
            ReleasedPeer {
                remote_media: true,
                remote_label: true
            }
        );
        assert!(display.is_stopped());
        assert!(peer.remote_tracks().is_empty());
        assert_eq!(peer.role(), NegotiationRole::Idle);

        assert_eq!(peer.reset().await, ReleasedPeer::default());
    }
}
