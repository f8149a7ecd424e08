use std::sync::Arc;

use crate::config::Config;
use crate::error::Error;
use crate::media::{MediaSource, MediaSourceAdapter, SourceSelector};
use crate::models::{IceCandidate, RoomToken, SessionDescription};
use crate::peer::{
    ConnectionManager, ConnectionState, DataChannelBridge, LinkEvent, NetworkOutcome, PeerBackend,
    CHAT_CHANNEL_LABEL,
};
use crate::session::{
    Command, EventReceiver, EventSender, NegotiationRole, PeerSession, SessionEvent,
    SessionHandle, SessionObserver,
};
use crate::signaling::{ClientSignal, SignalingMessage, SignalingTransport};

/// Per-client settings
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Shown to the remote party
    pub label: String,
    /// Consecutive connectivity losses before the UI is alerted
    pub connectivity_alert_threshold: u32,
}

impl SessionSettings {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            connectivity_alert_threshold: 3,
        }
    }

    pub fn from_config(label: impl Into<String>, config: &Config) -> Self {
        Self {
            label: label.into(),
            connectivity_alert_threshold: config.connectivity_alert_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RoomState {
    Idle,
    /// Join requested; `None` for a random join awaiting its assignment
    Joining(Option<RoomToken>),
    Joined(RoomToken),
}

/// Binds room membership to the peer connection.
///
/// Runs as one task draining the session queue; relay messages, connection
/// events and UI commands are handled strictly one after another, so no
/// handler ever observes another half-way through.
pub struct SessionController {
    settings: SessionSettings,
    transport: Arc<dyn SignalingTransport>,
    media: MediaSourceAdapter,
    peer: PeerSession,
    observer: Arc<dyn SessionObserver>,
    room: RoomState,
    rx: EventReceiver,
    consecutive_losses: u32,
    /// Random joins left before their room was assigned
    abandoned_assignments: u32,
    reported_state: ConnectionState,
}

impl SessionController {
    /// `queue` must be the same channel the transport was connected with.
    pub fn new(
        settings: SessionSettings,
        backend: Arc<dyn PeerBackend>,
        transport: Arc<dyn SignalingTransport>,
        source: Arc<dyn MediaSource>,
        observer: Arc<dyn SessionObserver>,
        queue: (EventSender, EventReceiver),
    ) -> (Self, SessionHandle) {
        let (tx, rx) = queue;
        let manager = ConnectionManager::new(backend, tx.clone());

        let controller = Self {
            settings,
            transport,
            media: MediaSourceAdapter::new(source),
            peer: PeerSession::new(manager),
            observer,
            room: RoomState::Idle,
            rx,
            consecutive_losses: 0,
            abandoned_assignments: 0,
            reported_state: ConnectionState::Empty,
        };
        (controller, SessionHandle::new(tx))
    }

    /// Process events until `shutdown`.
    pub async fn run(mut self) {
        tracing::info!(label = %self.settings.label, "Session started");

        while let Some(event) = self.rx.recv().await {
            if matches!(event, SessionEvent::Command(Command::Shutdown)) {
                self.leave(true).await;
                break;
            }
            self.handle_event(event).await;
        }

        self.transport.close().await;
        tracing::info!(label = %self.settings.label, "Session stopped");
    }

    pub async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Signal(msg) => self.on_signal(msg).await,
            SessionEvent::Link { generation, event } => {
                if !self.peer.manager().accepts(generation) {
                    tracing::trace!(generation, event = ?event, "Stale link event dropped");
                    return;
                }
                self.on_link_event(event).await;
            }
            SessionEvent::Command(command) => self.on_command(command).await,
            SessionEvent::TransportClosed(reason) => {
                let error = Error::Transport(reason);
                tracing::warn!(error = %error, "Relay connection lost, leaving room");
                self.observer.on_error(&error);
                self.leave(false).await;
            }
        }
    }

    // ==================== UI commands ====================

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Join(raw) => {
                if self.room != RoomState::Idle {
                    tracing::warn!(room = %raw, "Already in a room, join ignored");
                    return;
                }
                match RoomToken::parse(&raw) {
                    Ok(token) => self.start_join(Some(token)).await,
                    Err(e) => {
                        tracing::warn!(error = %e, "Join refused");
                        self.observer.on_error(&e);
                    }
                }
            }
            Command::JoinRandom => {
                if self.room != RoomState::Idle {
                    tracing::warn!("Already in a room, random join ignored");
                    return;
                }
                self.start_join(None).await;
            }
            Command::Leave | Command::Shutdown => {
                if self.room == RoomState::Idle {
                    tracing::debug!("Leave while not in a room");
                    return;
                }
                self.leave(true).await;
            }
            Command::ToggleMic => {
                let muted = self.media.toggle_mic();
                tracing::info!(muted, "Microphone toggled");
            }
            Command::ToggleCamera => {
                let video_enabled = self.media.toggle_camera();
                tracing::info!(video_enabled, "Camera toggled");
            }
            Command::SwitchSource(selector) => self.switch_source(selector).await,
            Command::SendChat(text) => match self.peer.channel() {
                Some(channel) => {
                    channel.send(&text).await;
                }
                None => tracing::debug!("No chat channel yet, message dropped"),
            },
        }
    }

    async fn start_join(&mut self, room: Option<RoomToken>) {
        let devices = match self.media.acquire_initial().await {
            Ok(devices) => devices,
            Err(e) => {
                tracing::warn!(error = %e, "Local media unavailable, join aborted");
                self.observer.on_error(&e);
                return;
            }
        };
        self.observer.on_devices_enumerated(&devices);

        let signal = match &room {
            Some(token) => ClientSignal::JoinRoom {
                room: token.to_string(),
            },
            None => ClientSignal::JoinRandom,
        };
        tracing::info!(room = ?room.as_ref().map(RoomToken::as_str), "Joining room");
        self.room = RoomState::Joining(room);

        if let Err(e) = self.transport.send(signal).await {
            tracing::warn!(error = %e, "Join request not sent");
            self.observer.on_error(&e);
            self.leave(false).await;
            return;
        }
        self.observer.on_local_label_ready(&self.settings.label);
    }

    async fn switch_source(&mut self, selector: SourceSelector) {
        let tracks = match self.media.switch_source(&selector).await {
            Ok(tracks) => tracks,
            Err(e) => {
                tracing::warn!(selector = ?selector, error = %e, "Source switch failed");
                self.observer.on_error(&e);
                return;
            }
        };

        for track in tracks {
            let kind = track.kind();
            match self
                .peer
                .manager_mut()
                .replace_outbound_track(kind, track)
                .await
            {
                Ok(true) => tracing::debug!(kind = %kind, "Outbound track replaced"),
                Ok(false) => {}
                Err(e) => tracing::warn!(kind = %kind, error = %e, "Outbound track not replaced"),
            }
        }
    }

    // ==================== Relay messages ====================

    async fn on_signal(&mut self, msg: SignalingMessage) {
        tracing::debug!(kind = msg.kind(), "Relay message");

        match msg {
            SignalingMessage::RoomAssigned { room } => {
                if self.abandoned_assignments > 0 {
                    self.abandoned_assignments -= 1;
                    // A newer join already moved the relay off this room
                    if self.room == RoomState::Idle {
                        tracing::info!(room = %room, "Releasing seat of an abandoned random join");
                        self.send(ClientSignal::LeaveRoom { room }).await;
                    }
                    return;
                }
                match &self.room {
                    RoomState::Joining(_) => {}
                    RoomState::Joined(current) if current.as_str() == room => return,
                    _ => {
                        tracing::debug!(room = %room, "Room assignment outside a join, ignored");
                        return;
                    }
                }
                tracing::info!(room = %room, "Room assigned");
                self.room = RoomState::Joined(RoomToken::assigned(room));
                self.ensure_connection().await;
            }
            SignalingMessage::Welcome => {
                if !self.confirm_membership(None) {
                    return;
                }
                self.ensure_connection().await;
                self.start_offer().await;
            }
            SignalingMessage::Offer {
                sdp,
                room,
                sender_label,
            } => {
                if !self.confirm_membership(Some(&room)) {
                    return;
                }
                self.ensure_connection().await;
                self.answer_offer(sdp, sender_label).await;
            }
            SignalingMessage::Answer { sdp, sender_label } => {
                match self.peer.manager_mut().apply_answer(sdp).await {
                    Ok(()) => self.set_remote_label(Some(sender_label)),
                    Err(e) => log_dropped("answer", &e),
                }
            }
            SignalingMessage::Candidate { candidate } => {
                if let Err(e) = self.peer.manager_mut().add_remote_candidate(candidate).await {
                    log_dropped("ice", &e);
                }
            }
            SignalingMessage::Bye { reason } => {
                tracing::info!(reason = %reason, "Remote party left");
                if !matches!(self.room, RoomState::Joined(_)) {
                    return;
                }
                if self.peer.manager().state() == ConnectionState::Building
                    && self.peer.role() == NegotiationRole::Idle
                {
                    let dropped = self.peer.manager_mut().discard_pending();
                    tracing::debug!(dropped, "Already on standby, nothing to regenerate");
                    return;
                }
                self.regenerate().await;
            }
            SignalingMessage::RoomFull => {
                if self.room == RoomState::Idle {
                    return;
                }
                tracing::warn!("Room is full, join aborted");
                self.observer.on_room_full();
                self.leave(false).await;
            }
        }
    }

    /// A welcome or offer proves membership even before the assignment.
    fn confirm_membership(&mut self, room: Option<&str>) -> bool {
        match &self.room {
            RoomState::Idle => {
                tracing::debug!("Signal while not in a room, ignored");
                false
            }
            RoomState::Joining(pending) => {
                let token = match (room, pending) {
                    (Some(name), _) => RoomToken::assigned(name),
                    (None, Some(token)) => token.clone(),
                    (None, None) => {
                        tracing::debug!("Welcome before room assignment, ignored");
                        return false;
                    }
                };
                self.room = RoomState::Joined(token);
                true
            }
            RoomState::Joined(current) => match room {
                Some(name) if current.as_str() != name => {
                    tracing::warn!(room = %name, current = %current, "Signal for another room, ignored");
                    false
                }
                _ => true,
            },
        }
    }

    async fn start_offer(&mut self) {
        if self.peer.manager().state() != ConnectionState::Building {
            tracing::debug!(
                state = %self.peer.manager().state(),
                "Negotiation already under way, welcome ignored"
            );
            return;
        }
        self.peer.set_role(NegotiationRole::Offering);

        match self
            .peer
            .manager_mut()
            .create_data_channel(CHAT_CHANNEL_LABEL)
            .await
        {
            Ok(link) => self.peer.attach_channel(DataChannelBridge::local(link)),
            Err(e) => {
                tracing::warn!(error = %e, "Chat channel not created");
                self.regenerate().await;
                return;
            }
        }

        let offer = match self.peer.manager_mut().create_offer().await {
            Ok(offer) => offer,
            Err(e) => {
                tracing::warn!(error = %e, "Offer not created");
                self.regenerate().await;
                return;
            }
        };
        self.notify_state();

        let Some(room) = self.room_name() else { return };
        self.send(ClientSignal::Offer {
            sdp: offer,
            room,
            sender_label: self.settings.label.clone(),
        })
        .await;
    }

    async fn answer_offer(&mut self, offer: SessionDescription, sender_label: String) {
        let state = self.peer.manager().state();
        if state != ConnectionState::Building {
            log_dropped(
                "offer",
                &Error::SignalingProtocol(format!("offer received while {}", state)),
            );
            return;
        }

        self.set_remote_label(Some(sender_label));
        self.peer.set_role(NegotiationRole::Answering);
        self.peer.arm_inbound_channel();

        let answer = match self.peer.manager_mut().accept_offer(offer).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(error = %e, "Offer not accepted");
                self.regenerate().await;
                return;
            }
        };
        self.notify_state();

        let Some(room) = self.room_name() else { return };
        self.send(ClientSignal::Answer {
            sdp: answer,
            room,
            sender_label: self.settings.label.clone(),
        })
        .await;
    }

    // ==================== Connection events ====================

    async fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::LocalCandidate(candidate) => self.send_local_candidate(candidate).await,
            LinkEvent::RemoteTrack(track) => {
                if self.peer.attach_remote_track(track.clone()) {
                    tracing::info!(track_id = %track.id(), kind = %track.kind(), "Remote stream attached");
                    self.observer.on_remote_stream_attached(&track);
                }
            }
            LinkEvent::InboundChannel(link) => {
                let label = link.label().to_string();
                if self.peer.capture_inbound_channel(link) {
                    tracing::debug!(label = %label, "Inbound data channel captured");
                } else {
                    tracing::debug!(label = %label, "Unexpected inbound data channel dropped");
                }
            }
            LinkEvent::ChannelMessage(text) => self.observer.on_chat_message(&text),
            LinkEvent::Network(state) => match self.peer.manager_mut().on_network_state(state) {
                NetworkOutcome::Established => {
                    self.consecutive_losses = 0;
                    self.peer.set_role(NegotiationRole::Connected);
                    self.notify_state();
                }
                NetworkOutcome::Lost => {
                    self.consecutive_losses += 1;
                    if self.consecutive_losses == self.settings.connectivity_alert_threshold {
                        let error = Error::ConnectivityLost {
                            attempts: self.consecutive_losses,
                        };
                        tracing::warn!(error = %error, "Peer connectivity keeps failing");
                        self.observer.on_error(&error);
                    }
                    self.regenerate().await;
                }
                NetworkOutcome::Unchanged => {}
            },
        }
    }

    async fn send_local_candidate(&mut self, candidate: IceCandidate) {
        if candidate.is_end_of_candidates() {
            return;
        }
        let Some(room) = self.room_name() else {
            tracing::debug!("Local candidate outside a room, not sent");
            return;
        };
        self.send(ClientSignal::Ice { candidate, room }).await;
    }

    // ==================== Lifecycle ====================

    /// Build the standby connection unless one is already live.
    async fn ensure_connection(&mut self) {
        match self.peer.manager().state() {
            ConnectionState::Building
            | ConnectionState::Negotiating
            | ConnectionState::Connected => return,
            ConnectionState::Empty | ConnectionState::Closed => {}
        }

        let Some(tracks) = self.media.tracks().cloned() else {
            tracing::warn!("No local media, connection not built");
            return;
        };
        match self.peer.manager_mut().build(&tracks).await {
            Ok(()) => self.notify_state(),
            Err(e) => {
                tracing::warn!(error = %e, "Connection not built");
                self.observer.on_error(&e);
            }
        }
    }

    /// Drop the current connection and, while still in a room, stand by with
    /// a fresh one.
    async fn regenerate(&mut self) {
        tracing::info!(generation = self.peer.manager().generation(), "Regenerating connection");

        self.release_peer().await;
        if matches!(self.room, RoomState::Joined(_)) {
            self.ensure_connection().await;
        }
    }

    async fn leave(&mut self, notify_relay: bool) {
        let room = std::mem::replace(&mut self.room, RoomState::Idle);

        self.release_peer().await;
        self.media.stop_all();
        self.consecutive_losses = 0;

        if notify_relay && room == RoomState::Joining(None) {
            self.abandoned_assignments += 1;
        }

        let name = match room {
            RoomState::Joined(token) | RoomState::Joining(Some(token)) => Some(token.to_string()),
            _ => None,
        };
        if let (true, Some(room)) = (notify_relay, name.clone()) {
            self.send(ClientSignal::LeaveRoom { room }).await;
        }
        tracing::info!(room = ?name, "Left room");
    }

    async fn release_peer(&mut self) {
        let released = self.peer.reset().await;
        if released.remote_media {
            self.observer.on_remote_stream_detached();
        }
        if released.remote_label {
            self.observer.on_remote_label_changed(None);
        }
        self.notify_state();
    }

    fn set_remote_label(&mut self, label: Option<String>) {
        if self.peer.set_remote_label(label) {
            self.observer.on_remote_label_changed(self.peer.remote_label());
        }
    }

    fn room_name(&self) -> Option<String> {
        match &self.room {
            RoomState::Joined(token) | RoomState::Joining(Some(token)) => Some(token.to_string()),
            _ => None,
        }
    }

    fn notify_state(&mut self) {
        let state = self.peer.manager().state();
        if state != self.reported_state {
            self.reported_state = state;
            self.observer.on_connection_state(state);
        }
    }

    async fn send(&self, signal: ClientSignal) {
        let kind = signal.kind();
        if let Err(e) = self.transport.send(signal).await {
            tracing::warn!(kind, error = %e, "Signal not sent");
        }
    }
}

fn log_dropped(kind: &str, error: &Error) {
    if error.is_stale() {
        tracing::debug!(kind, error = %error, "Signal no longer applies, dropped");
    } else {
        tracing::warn!(kind, error = %error, "Signal dropped");
    }
}
