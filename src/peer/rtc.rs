//! Peer backend on top of webrtc-rs.

use std::sync::Arc;

use async_trait::async_trait;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecParameters;
use webrtc::track::track_remote::TrackRemote;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::media::{LocalTrack, MediaKind, RemoteTrack, RemoteTrackReader};
use crate::models::{IceCandidate, SdpKind, SessionDescription};
use crate::peer::{DataLink, LinkEvent, LinkEvents, NetworkState, PeerBackend, PeerLink};

/// Opens real peer connections (Opus audio, VP8 video, SCTP data channels)
pub struct RtcBackend {
    api: API,
    ice_servers: Vec<RTCIceServer>,
}

impl RtcBackend {
    pub fn new(config: &Config) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        for kind in [MediaKind::Audio, MediaKind::Video] {
            media_engine.register_codec(
                RTCRtpCodecParameters {
                    capability: kind.codec_capability(),
                    payload_type: kind.payload_type(),
                    ..Default::default()
                },
                kind.codec_type(),
            )?;
        }

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .with_setting_engine(SettingEngine::default())
            .build();

        let mut ice_servers = vec![RTCIceServer {
            urls: vec![config.stun_server.clone()],
            ..Default::default()
        }];

        if let Some(turn_server) = &config.turn_server {
            ice_servers.push(RTCIceServer {
                urls: vec![turn_server.clone()],
                username: config.turn_username.clone().unwrap_or_default(),
                credential: config.turn_credential.clone().unwrap_or_default(),
                ..Default::default()
            });
        }

        Ok(Self { api, ice_servers })
    }

    fn create_config(&self) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl PeerBackend for RtcBackend {
    async fn open(&self, events: LinkEvents) -> Result<Box<dyn PeerLink>> {
        let peer_connection = Arc::new(self.api.new_peer_connection(self.create_config()).await?);

        let candidate_events = events.clone();
        peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let events = candidate_events.clone();
            Box::pin(async move {
                // None marks the end of gathering and is not signaled
                let Some(candidate) = candidate else { return };
                match candidate.to_json() {
                    Ok(init) => events.emit(LinkEvent::LocalCandidate(IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                        username_fragment: init.username_fragment,
                    })),
                    Err(e) => tracing::warn!(error = %e, "Error serializing local candidate"),
                }
            })
        }));

        let ice_events = events.clone();
        peer_connection.on_ice_connection_state_change(Box::new(
            move |state: RTCIceConnectionState| {
                tracing::debug!(generation = ice_events.generation(), state = %state, "ICE connection state changed");
                let mapped = match state {
                    RTCIceConnectionState::New => Some(NetworkState::New),
                    RTCIceConnectionState::Checking => Some(NetworkState::Checking),
                    RTCIceConnectionState::Connected | RTCIceConnectionState::Completed => {
                        Some(NetworkState::Connected)
                    }
                    RTCIceConnectionState::Disconnected => Some(NetworkState::Disconnected),
                    RTCIceConnectionState::Failed => Some(NetworkState::Failed),
                    RTCIceConnectionState::Closed => Some(NetworkState::Closed),
                    _ => None,
                };
                if let Some(mapped) = mapped {
                    ice_events.emit(LinkEvent::Network(mapped));
                }
                Box::pin(async {})
            },
        ));

        let generation = events.generation();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                tracing::info!(generation, state = ?state, "Peer connection state changed");
                Box::pin(async {})
            },
        ));

        let track_events = events.clone();
        peer_connection.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
            let events = track_events.clone();
            Box::pin(async move {
                let Some(kind) = MediaKind::from_codec_type(track.kind()) else {
                    tracing::warn!(kind = %track.kind(), "Ignoring inbound track of unknown kind");
                    return;
                };
                tracing::info!(
                    kind = %kind,
                    codec = %track.codec().capability.mime_type,
                    "Received remote track"
                );

                let handle = RemoteTrack::new(&track.id(), kind, &track.stream_id());
                RemoteTrackReader::new(track, handle.clone()).start();
                events.emit(LinkEvent::RemoteTrack(handle));
            })
        }));

        let channel_events = events.clone();
        peer_connection.on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
            let events = channel_events.clone();
            Box::pin(async move {
                tracing::debug!(label = %channel.label(), "Inbound data channel");
                let link = RtcDataLink::new(channel, events.clone());
                events.emit(LinkEvent::InboundChannel(Arc::new(link)));
            })
        }));

        Ok(Box::new(RtcLink {
            peer_connection,
            events,
        }))
    }
}

struct RtcLink {
    peer_connection: Arc<RTCPeerConnection>,
    events: LinkEvents,
}

fn to_rtc(description: SessionDescription) -> Result<RTCSessionDescription> {
    let rtc = match description.kind {
        SdpKind::Offer => RTCSessionDescription::offer(description.sdp)?,
        SdpKind::Answer => RTCSessionDescription::answer(description.sdp)?,
    };
    Ok(rtc)
}

fn from_rtc(description: RTCSessionDescription) -> Result<SessionDescription> {
    match description.sdp_type {
        RTCSdpType::Offer => Ok(SessionDescription::offer(description.sdp)),
        RTCSdpType::Answer => Ok(SessionDescription::answer(description.sdp)),
        other => Err(Error::WebRtc(format!(
            "unsupported description type {}",
            other
        ))),
    }
}

#[async_trait]
impl PeerLink for RtcLink {
    async fn add_track(&self, track: &Arc<LocalTrack>) -> Result<()> {
        let rtp_sender = self.peer_connection.add_track(track.rtc_track()).await?;

        // Drain RTCP so interceptors keep running
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while let Ok((_, _)) = rtp_sender.read(&mut rtcp_buf).await {}
        });
        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataLink>> {
        let channel = self
            .peer_connection
            .create_data_channel(
                label,
                Some(RTCDataChannelInit {
                    ordered: Some(true),
                    ..Default::default()
                }),
            )
            .await?;
        Ok(Arc::new(RtcDataLink::new(channel, self.events.clone())))
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        from_rtc(self.peer_connection.create_offer(None).await?)
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        from_rtc(self.peer_connection.create_answer(None).await?)
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.peer_connection
            .set_local_description(to_rtc(description)?)
            .await?;
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.peer_connection
            .set_remote_description(to_rtc(description)?)
            .await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.peer_connection
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: candidate.username_fragment,
            })
            .await?;
        Ok(())
    }

    async fn replace_track(&self, kind: MediaKind, track: &Arc<LocalTrack>) -> Result<bool> {
        for sender in self.peer_connection.get_senders().await {
            let Some(current) = sender.track().await else {
                continue;
            };
            if MediaKind::from_codec_type(current.kind()) != Some(kind) {
                continue;
            }
            sender.replace_track(Some(track.rtc_track())).await?;
            return Ok(true);
        }
        Ok(false)
    }

    async fn close(&self) -> Result<()> {
        self.peer_connection.close().await?;
        Ok(())
    }
}

struct RtcDataLink {
    channel: Arc<RTCDataChannel>,
    label: String,
}

impl RtcDataLink {
    fn new(channel: Arc<RTCDataChannel>, events: LinkEvents) -> Self {
        let label = channel.label().to_string();
        channel.on_message(Box::new(move |message: DataChannelMessage| {
            let events = events.clone();
            Box::pin(async move {
                if !message.is_string {
                    tracing::debug!("Binary data channel message ignored");
                    return;
                }
                match String::from_utf8(message.data.to_vec()) {
                    Ok(text) => events.emit(LinkEvent::ChannelMessage(text)),
                    Err(e) => tracing::warn!(error = %e, "Invalid UTF-8 on data channel"),
                }
            })
        }));

        Self { channel, label }
    }
}

#[async_trait]
impl DataLink for RtcDataLink {
    fn label(&self) -> &str {
        &self.label
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        self.channel.send_text(text.to_string()).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.channel.close().await?;
        Ok(())
    }
}
