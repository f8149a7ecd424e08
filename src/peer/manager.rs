use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::media::{LocalTrack, MediaKind, TrackSet};
use crate::models::{IceCandidate, SdpKind, SessionDescription};
use crate::peer::{DataLink, LinkEvents, NetworkState, PeerBackend, PeerLink};
use crate::session::EventSender;

/// Lifecycle of the single peer connection a session may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Empty,
    Building,
    Negotiating,
    Connected,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Empty => "EMPTY",
            ConnectionState::Building => "BUILDING",
            ConnectionState::Negotiating => "NEGOTIATING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// What a network report means for the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkOutcome {
    Unchanged,
    Established,
    Lost,
}

/// Owns at most one live peer connection and tracks its negotiation.
///
/// Every mutating operation takes `&mut self`, so the session's event loop is
/// the only writer and a teardown can never interleave with a negotiation
/// step on the same connection. Events produced by a connection carry its
/// generation; callers drop those for which [`accepts`](Self::accepts)
/// returns false.
pub struct ConnectionManager {
    backend: Arc<dyn PeerBackend>,
    events: EventSender,
    state: ConnectionState,
    generation: u64,
    link: Option<Box<dyn PeerLink>>,
    attached: Vec<Arc<LocalTrack>>,
    pending_candidates: Vec<IceCandidate>,
    local_offer: bool,
    remote_description_set: bool,
}

impl ConnectionManager {
    pub fn new(backend: Arc<dyn PeerBackend>, events: EventSender) -> Self {
        Self {
            backend,
            events,
            state: ConnectionState::Empty,
            generation: 0,
            link: None,
            attached: Vec::new(),
            pending_candidates: Vec::new(),
            local_offer: false,
            remote_description_set: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether an event tagged with `generation` belongs to the live connection
    pub fn accepts(&self, generation: u64) -> bool {
        self.link.is_some() && generation == self.generation
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    /// Forget buffered remote candidates; the party that sent them is gone.
    /// Returns how many were dropped.
    pub fn discard_pending(&mut self) -> usize {
        let dropped = self.pending_candidates.len();
        self.pending_candidates.clear();
        dropped
    }

    pub fn attached_tracks(&self) -> &[Arc<LocalTrack>] {
        &self.attached
    }

    /// Create a fresh connection and attach every track of `tracks`.
    pub async fn build(&mut self, tracks: &TrackSet) -> Result<()> {
        if self.link.is_some() {
            return Err(Error::InvalidState(format!(
                "a connection is already {}",
                self.state
            )));
        }
        if tracks.is_empty() {
            return Err(Error::InvalidState("no local track set".to_string()));
        }

        self.generation += 1;
        let link = self
            .backend
            .open(LinkEvents::new(self.generation, self.events.clone()))
            .await?;

        for track in tracks.tracks() {
            if let Err(e) = link.add_track(track).await {
                if let Err(close_err) = link.close().await {
                    tracing::warn!(error = %close_err, "Error closing half-built connection");
                }
                return Err(e);
            }
        }

        self.link = Some(link);
        self.attached = tracks.tracks().cloned().collect();
        self.reset_negotiation();
        self.transition(ConnectionState::Building);
        Ok(())
    }

    /// Open the chat channel from this side. Only valid before the offer.
    pub async fn create_data_channel(&mut self, label: &str) -> Result<Arc<dyn DataLink>> {
        if self.state != ConnectionState::Building {
            return Err(Error::InvalidState(format!(
                "cannot open a data channel while {}",
                self.state
            )));
        }
        self.live_link()?.create_data_channel(label).await
    }

    /// Produce the local offer and commit it as the local description.
    pub async fn create_offer(&mut self) -> Result<SessionDescription> {
        if self.state != ConnectionState::Building {
            return Err(Error::InvalidState(format!(
                "cannot create an offer while {}",
                self.state
            )));
        }
        if self.attached.is_empty() {
            return Err(Error::InvalidState("no local track set attached".to_string()));
        }

        let link = self.live_link()?;
        let offer = link.create_offer().await?;
        link.set_local_description(offer.clone()).await?;

        self.local_offer = true;
        self.transition(ConnectionState::Negotiating);
        Ok(offer)
    }

    /// Apply a remote offer, flush buffered candidates and answer it.
    pub async fn accept_offer(&mut self, remote: SessionDescription) -> Result<SessionDescription> {
        if remote.kind != SdpKind::Offer {
            return Err(Error::SignalingProtocol(format!(
                "expected an offer, got {:?}",
                remote.kind
            )));
        }
        if self.state != ConnectionState::Building {
            return Err(Error::SignalingProtocol(format!(
                "offer received while {}",
                self.state
            )));
        }

        self.live_link()?.set_remote_description(remote).await?;
        self.remote_description_set = true;
        self.transition(ConnectionState::Negotiating);
        self.flush_candidates().await;

        let link = self.live_link()?;
        let answer = link.create_answer().await?;
        link.set_local_description(answer.clone()).await?;
        Ok(answer)
    }

    /// Commit the remote answer to our own offer.
    pub async fn apply_answer(&mut self, remote: SessionDescription) -> Result<()> {
        if remote.kind != SdpKind::Answer {
            return Err(Error::SignalingProtocol(format!(
                "expected an answer, got {:?}",
                remote.kind
            )));
        }
        if self.state != ConnectionState::Negotiating
            || !self.local_offer
            || self.remote_description_set
        {
            return Err(Error::NegotiationStale(format!(
                "answer received while {} (local offer: {}, remote description: {})",
                self.state, self.local_offer, self.remote_description_set
            )));
        }

        self.live_link()?.set_remote_description(remote).await?;
        self.remote_description_set = true;
        self.flush_candidates().await;
        Ok(())
    }

    /// Apply a remote candidate, or hold it until the remote description is
    /// committed.
    pub async fn add_remote_candidate(&mut self, candidate: IceCandidate) -> Result<()> {
        if candidate.is_end_of_candidates() {
            tracing::trace!("End-of-candidates marker ignored");
            return Ok(());
        }
        candidate.validate()?;

        if self.link.is_none() {
            return Err(Error::NegotiationStale(
                "candidate received without a live connection".to_string(),
            ));
        }
        if !self.remote_description_set {
            self.pending_candidates.push(candidate);
            tracing::debug!(
                generation = self.generation,
                buffered = self.pending_candidates.len(),
                "Remote candidate buffered"
            );
            return Ok(());
        }

        self.live_link()?.add_ice_candidate(candidate).await
    }

    /// Swap the outbound track of `kind`. Returns `false` when there is no
    /// connection (or no sender of that kind); the swap then only affects
    /// local media.
    pub async fn replace_outbound_track(
        &mut self,
        kind: MediaKind,
        track: Arc<LocalTrack>,
    ) -> Result<bool> {
        let Some(link) = self.link.as_deref() else {
            tracing::debug!(kind = %kind, "No connection, outbound track not replaced");
            return Ok(false);
        };

        let replaced = link.replace_track(kind, &track).await?;
        if replaced {
            self.attached.retain(|t| t.kind() != kind);
            self.attached.push(track);
        }
        Ok(replaced)
    }

    /// Interpret a network report from the live connection.
    pub fn on_network_state(&mut self, state: NetworkState) -> NetworkOutcome {
        if self.link.is_none() {
            return NetworkOutcome::Unchanged;
        }

        match state {
            NetworkState::Connected if self.state == ConnectionState::Negotiating => {
                self.transition(ConnectionState::Connected);
                NetworkOutcome::Established
            }
            NetworkState::Disconnected | NetworkState::Failed => {
                tracing::info!(
                    generation = self.generation,
                    state = ?state,
                    "Peer connectivity lost"
                );
                NetworkOutcome::Lost
            }
            _ => NetworkOutcome::Unchanged,
        }
    }

    /// Close the connection and forget everything about it. Safe to call in
    /// any state, any number of times.
    pub async fn teardown(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };

        if let Err(e) = link.close().await {
            tracing::warn!(generation = self.generation, error = %e, "Error closing connection");
        }

        self.attached.clear();
        self.reset_negotiation();
        self.transition(ConnectionState::Closed);
    }

    fn live_link(&self) -> Result<&dyn PeerLink> {
        self.link
            .as_deref()
            .ok_or_else(|| Error::InvalidState(format!("no live connection ({})", self.state)))
    }

    async fn flush_candidates(&mut self) {
        let pending = std::mem::take(&mut self.pending_candidates);
        if pending.is_empty() {
            return;
        }
        let Some(link) = self.link.as_deref() else {
            return;
        };

        let count = pending.len();
        for candidate in pending {
            if let Err(e) = link.add_ice_candidate(candidate).await {
                tracing::warn!(error = %e, "Error applying buffered candidate");
            }
        }
        tracing::debug!(generation = self.generation, count, "Buffered candidates applied");
    }

    fn reset_negotiation(&mut self) {
        self.pending_candidates.clear();
        self.local_offer = false;
        self.remote_description_set = false;
    }

    fn transition(&mut self, next: ConnectionState) {
        tracing::debug!(
            generation = self.generation,
            from = %self.state,
            to = %next,
            "Connection state changed"
        );
        self.state = next;
    }
}
