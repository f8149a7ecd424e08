//! Seam between the connection manager and a concrete peer-connection stack.
//!
//! A backend opens links; a link is one peer connection. Everything the link
//! observes (local candidates, inbound tracks and channels, network state,
//! channel messages) is reported as a [`LinkEvent`] on the owning session's
//! queue, tagged with the generation of the connection that produced it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::media::{LocalTrack, MediaKind, RemoteTrack};
use crate::models::{IceCandidate, SessionDescription};
use crate::session::{EventSender, SessionEvent};

/// Network-layer connectivity as reported by the ICE agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    New,
    Checking,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Observation made by a link
pub enum LinkEvent {
    LocalCandidate(IceCandidate),
    RemoteTrack(RemoteTrack),
    InboundChannel(Arc<dyn DataLink>),
    ChannelMessage(String),
    Network(NetworkState),
}

impl fmt::Debug for LinkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkEvent::LocalCandidate(c) => f.debug_tuple("LocalCandidate").field(c).finish(),
            LinkEvent::RemoteTrack(t) => f.debug_tuple("RemoteTrack").field(t).finish(),
            LinkEvent::InboundChannel(c) => {
                f.debug_tuple("InboundChannel").field(&c.label()).finish()
            }
            LinkEvent::ChannelMessage(m) => f.debug_tuple("ChannelMessage").field(m).finish(),
            LinkEvent::Network(s) => f.debug_tuple("Network").field(s).finish(),
        }
    }
}

/// Sink a link reports into; cloned into every backend callback.
#[derive(Clone)]
pub struct LinkEvents {
    generation: u64,
    tx: EventSender,
}

impl LinkEvents {
    pub fn new(generation: u64, tx: EventSender) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn emit(&self, event: LinkEvent) {
        if self
            .tx
            .send(SessionEvent::Link {
                generation: self.generation,
                event,
            })
            .is_err()
        {
            tracing::trace!(generation = self.generation, "Session gone, link event dropped");
        }
    }
}

/// Factory for peer connections
#[async_trait]
pub trait PeerBackend: Send + Sync {
    /// Create a connection whose observations go to `events`.
    async fn open(&self, events: LinkEvents) -> Result<Box<dyn PeerLink>>;
}

/// One peer connection
#[async_trait]
pub trait PeerLink: Send + Sync {
    async fn add_track(&self, track: &Arc<LocalTrack>) -> Result<()>;

    /// Open an ordered data channel from this side.
    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataLink>>;

    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Swap the track on the sender of `kind`; `false` if there is no such
    /// sender.
    async fn replace_track(&self, kind: MediaKind, track: &Arc<LocalTrack>) -> Result<bool>;

    async fn close(&self) -> Result<()>;
}

/// One data channel of a link
#[async_trait]
pub trait DataLink: Send + Sync {
    fn label(&self) -> &str;

    async fn send_text(&self, text: &str) -> Result<()>;

    async fn close(&self) -> Result<()>;
}
