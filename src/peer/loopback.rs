//! In-process peer backend.
//!
//! Links opened on the same [`LoopbackNetwork`] find each other through the
//! descriptions they exchange, report `Connected` once both sides hold a
//! local and a remote description, and carry data channel text between
//! them. No media flows; inbound tracks are announced from the remote
//! description the way a browser announces them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::media::{LocalTrack, MediaKind, RemoteTrack};
use crate::models::{IceCandidate, SdpKind, SessionDescription};
use crate::peer::{DataLink, LinkEvent, LinkEvents, NetworkState, PeerBackend, PeerLink};

const LINK_ATTR: &str = "a=x-loopback-link:";
const TRACK_ATTR: &str = "a=x-loopback-track:";
const CHANNEL_ATTR: &str = "a=x-loopback-channel:";

struct LinkRecord {
    events: LinkEvents,
    tracks: Vec<(MediaKind, String)>,
    replaced: Vec<(MediaKind, String)>,
    channels: Vec<String>,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    peer: Option<u64>,
    applied_candidates: Vec<IceCandidate>,
    connected: bool,
    closed: bool,
}

impl LinkRecord {
    fn new(events: LinkEvents) -> Self {
        Self {
            events,
            tracks: Vec::new(),
            replaced: Vec::new(),
            channels: Vec::new(),
            local: None,
            remote: None,
            peer: None,
            applied_candidates: Vec::new(),
            connected: false,
            closed: false,
        }
    }

    fn ready(&self) -> bool {
        !self.closed && self.local.is_some() && self.remote.is_some()
    }
}

#[derive(Default)]
struct NetworkInner {
    next_id: u64,
    links: HashMap<u64, LinkRecord>,
}

impl NetworkInner {
    fn link(&mut self, id: u64) -> Result<&mut LinkRecord> {
        self.links
            .get_mut(&id)
            .filter(|record| !record.closed)
            .ok_or_else(|| Error::InvalidState(format!("loopback link {} is closed", id)))
    }

    fn try_connect(&mut self, id: u64) {
        let Some(peer_id) = self.links.get(&id).and_then(|r| r.peer) else {
            return;
        };
        let both_ready = match (self.links.get(&id), self.links.get(&peer_id)) {
            (Some(a), Some(b)) => {
                a.ready() && b.ready() && b.peer == Some(id) && !a.connected && !b.connected
            }
            _ => false,
        };
        if !both_ready {
            return;
        }

        for link_id in [id, peer_id] {
            if let Some(record) = self.links.get_mut(&link_id) {
                record.connected = true;
                record.events.emit(LinkEvent::Network(NetworkState::Connected));
            }
        }
        tracing::debug!(a = id, b = peer_id, "Loopback links connected");
    }
}

/// Shared in-memory "network" that pairs loopback links
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    inner: Arc<Mutex<NetworkInner>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of every link ever opened, oldest first
    pub async fn link_ids(&self) -> Vec<u64> {
        let inner = self.inner.lock().await;
        let mut ids: Vec<u64> = inner.links.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Ids of links that are not closed, oldest first
    pub async fn open_link_ids(&self) -> Vec<u64> {
        let inner = self.inner.lock().await;
        let mut ids: Vec<u64> = inner
            .links
            .iter()
            .filter(|(_, record)| !record.closed)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub async fn applied_candidates(&self, id: u64) -> Vec<IceCandidate> {
        let inner = self.inner.lock().await;
        inner
            .links
            .get(&id)
            .map(|r| r.applied_candidates.clone())
            .unwrap_or_default()
    }

    pub async fn replaced_tracks(&self, id: u64) -> Vec<(MediaKind, String)> {
        let inner = self.inner.lock().await;
        inner
            .links
            .get(&id)
            .map(|r| r.replaced.clone())
            .unwrap_or_default()
    }

    pub async fn channel_labels(&self, id: u64) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner
            .links
            .get(&id)
            .map(|r| r.channels.clone())
            .unwrap_or_default()
    }

    pub async fn is_connected(&self, id: u64) -> bool {
        let inner = self.inner.lock().await;
        inner.links.get(&id).is_some_and(|r| r.connected)
    }

    /// Report a network state on a link as if its ICE agent had seen it
    pub async fn inject_network_state(&self, id: u64, state: NetworkState) {
        let mut inner = self.inner.lock().await;
        if let Some(record) = inner.links.get_mut(&id) {
            if matches!(state, NetworkState::Disconnected | NetworkState::Failed) {
                record.connected = false;
            }
            record.events.emit(LinkEvent::Network(state));
        }
    }
}

#[async_trait]
impl PeerBackend for LoopbackNetwork {
    async fn open(&self, events: LinkEvents) -> Result<Box<dyn PeerLink>> {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.links.insert(id, LinkRecord::new(events));

        Ok(Box::new(LoopbackLink {
            id,
            network: self.clone(),
        }))
    }
}

struct LoopbackLink {
    id: u64,
    network: LoopbackNetwork,
}

impl LoopbackLink {
    fn render(&self, kind: SdpKind, record: &LinkRecord) -> SessionDescription {
        let mut sdp = format!(
            "v=0\r\no=- {id} 1 IN IP4 127.0.0.1\r\ns=loopback\r\n{LINK_ATTR}{id}\r\n",
            id = self.id
        );
        for (kind, track_id) in &record.tracks {
            sdp.push_str(&format!(
                "m={kind} 9 UDP/TLS/RTP/SAVPF {pt}\r\n{TRACK_ATTR}{kind} {track_id}\r\n",
                pt = kind.payload_type()
            ));
        }
        if kind == SdpKind::Offer {
            for label in &record.channels {
                sdp.push_str(&format!(
                    "m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n{CHANNEL_ATTR}{label}\r\n"
                ));
            }
        }

        SessionDescription { kind, sdp }
    }
}

struct ParsedSdp {
    link: u64,
    tracks: Vec<(MediaKind, String)>,
    channels: Vec<String>,
}

fn parse_sdp(sdp: &str) -> Result<ParsedSdp> {
    let mut link = None;
    let mut tracks = Vec::new();
    let mut channels = Vec::new();

    for line in sdp.lines() {
        if let Some(id) = line.strip_prefix(LINK_ATTR) {
            link = id.trim().parse::<u64>().ok();
        } else if let Some(rest) = line.strip_prefix(TRACK_ATTR) {
            let mut parts = rest.split_whitespace();
            let kind = match parts.next() {
                Some("audio") => MediaKind::Audio,
                Some("video") => MediaKind::Video,
                _ => continue,
            };
            if let Some(track_id) = parts.next() {
                tracks.push((kind, track_id.to_string()));
            }
        } else if let Some(label) = line.strip_prefix(CHANNEL_ATTR) {
            channels.push(label.trim().to_string());
        }
    }

    let link = link.ok_or_else(|| {
        Error::SignalingProtocol("description does not come from a loopback link".to_string())
    })?;
    Ok(ParsedSdp {
        link,
        tracks,
        channels,
    })
}

#[async_trait]
impl PeerLink for LoopbackLink {
    async fn add_track(&self, track: &Arc<LocalTrack>) -> Result<()> {
        let mut inner = self.network.inner.lock().await;
        inner
            .link(self.id)?
            .tracks
            .push((track.kind(), track.id().to_string()));
        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataLink>> {
        let mut inner = self.network.inner.lock().await;
        inner.link(self.id)?.channels.push(label.to_string());
        Ok(Arc::new(LoopbackChannel {
            link_id: self.id,
            label: label.to_string(),
            network: self.network.clone(),
        }))
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let mut inner = self.network.inner.lock().await;
        let record = inner.link(self.id)?;
        Ok(self.render(SdpKind::Offer, record))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let mut inner = self.network.inner.lock().await;
        let record = inner.link(self.id)?;
        match &record.remote {
            Some(remote) if remote.kind == SdpKind::Offer => {
                Ok(self.render(SdpKind::Answer, record))
            }
            _ => Err(Error::InvalidState(
                "cannot answer without a remote offer".to_string(),
            )),
        }
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        let mut inner = self.network.inner.lock().await;
        let record = inner.link(self.id)?;
        record.local = Some(description);

        let port = 40000 + self.id;
        record.events.emit(LinkEvent::LocalCandidate(IceCandidate::new(
            format!(
                "candidate:{id} 1 udp 2122252543 127.0.0.1 {port} typ host",
                id = self.id
            ),
            Some("0"),
            Some(0),
        )));

        inner.try_connect(self.id);
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let parsed = parse_sdp(&description.sdp)?;
        let is_offer = description.kind == SdpKind::Offer;

        let mut inner = self.network.inner.lock().await;
        let record = inner.link(self.id)?;
        record.remote = Some(description);
        record.peer = Some(parsed.link);

        if is_offer {
            for label in parsed.channels {
                record.channels.push(label.clone());
                record
                    .events
                    .emit(LinkEvent::InboundChannel(Arc::new(LoopbackChannel {
                        link_id: self.id,
                        label,
                        network: self.network.clone(),
                    })));
            }
        }
        let stream_id = format!("loopback-{}", parsed.link);
        for (kind, track_id) in parsed.tracks {
            record.events.emit(LinkEvent::RemoteTrack(RemoteTrack::new(
                &track_id, kind, &stream_id,
            )));
        }

        inner.try_connect(self.id);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let mut inner = self.network.inner.lock().await;
        let record = inner.link(self.id)?;
        if record.remote.is_none() {
            return Err(Error::InvalidState(
                "remote description not set".to_string(),
            ));
        }
        record.applied_candidates.push(candidate);
        Ok(())
    }

    async fn replace_track(&self, kind: MediaKind, track: &Arc<LocalTrack>) -> Result<bool> {
        let mut inner = self.network.inner.lock().await;
        let record = inner.link(self.id)?;
        let Some(slot) = record.tracks.iter_mut().find(|(k, _)| *k == kind) else {
            return Ok(false);
        };
        slot.1 = track.id().to_string();
        record.replaced.push((kind, track.id().to_string()));
        Ok(true)
    }

    async fn close(&self) -> Result<()> {
        let mut inner = self.network.inner.lock().await;
        if let Some(record) = inner.links.get_mut(&self.id) {
            record.closed = true;
            record.connected = false;
        }
        Ok(())
    }
}

struct LoopbackChannel {
    link_id: u64,
    label: String,
    network: LoopbackNetwork,
}

#[async_trait]
impl DataLink for LoopbackChannel {
    fn label(&self) -> &str {
        &self.label
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        let inner = self.network.inner.lock().await;
        let not_open = || Error::Transport(format!("channel '{}' is not open", self.label));

        let record = inner.links.get(&self.link_id).ok_or_else(not_open)?;
        if !record.connected || record.closed {
            return Err(not_open());
        }
        let peer = record
            .peer
            .and_then(|id| inner.links.get(&id))
            .filter(|peer| !peer.closed && peer.channels.contains(&self.label))
            .ok_or_else(not_open)?;

        peer.events
            .emit(LinkEvent::ChannelMessage(text.to_string()));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut inner = self.network.inner.lock().await;
        if let Some(record) = inner.links.get_mut(&self.link_id) {
            record.channels.retain(|label| label != &self.label);
        }
        Ok(())
    }
}
