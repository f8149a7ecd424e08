use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::error::Result;

const LOCAL_STREAM_ID: &str = "roomcall-local";

/// Media kind of a track or sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    /// Codec every track of this kind is encoded with (Opus / VP8)
    pub fn codec_capability(self) -> RTCRtpCodecCapability {
        match self {
            MediaKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
                rtcp_feedback: vec![],
            },
            MediaKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90000,
                channels: 0,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
        }
    }

    pub fn payload_type(self) -> u8 {
        match self {
            MediaKind::Audio => 111,
            MediaKind::Video => 96,
        }
    }

    pub fn codec_type(self) -> RTPCodecType {
        match self {
            MediaKind::Audio => RTPCodecType::Audio,
            MediaKind::Video => RTPCodecType::Video,
        }
    }

    pub fn from_codec_type(codec_type: RTPCodecType) -> Option<Self> {
        match codec_type {
            RTPCodecType::Audio => Some(MediaKind::Audio),
            RTPCodecType::Video => Some(MediaKind::Video),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => f.write_str("audio"),
            MediaKind::Video => f.write_str("video"),
        }
    }
}

/// Logical source the user picks from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSelector {
    DefaultCamera,
    Camera(String),
    Screen,
    Microphone(String),
}

impl SourceSelector {
    /// The track kind a hot swap to this source replaces
    pub fn swapped_kind(&self) -> MediaKind {
        match self {
            SourceSelector::Microphone(_) => MediaKind::Audio,
            _ => MediaKind::Video,
        }
    }

    /// Whether the selector names an exact device (needs prior permission)
    pub fn is_constrained(&self) -> bool {
        matches!(
            self,
            SourceSelector::Camera(_) | SourceSelector::Microphone(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    VideoInput,
    AudioInput,
}

/// Capture device as reported by enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub label: String,
    pub kind: DeviceKind,
}

/// A locally captured track.
///
/// The media adapter owns it; the connection manager only holds clones of the
/// `Arc` while the track is attached to a sender.
pub struct LocalTrack {
    id: String,
    kind: MediaKind,
    label: String,
    device_id: String,
    enabled: AtomicBool,
    stopped: AtomicBool,
    sample_track: Arc<TrackLocalStaticSample>,
}

impl LocalTrack {
    pub fn new(kind: MediaKind, label: &str, device_id: &str) -> Self {
        let id = format!("{}-{}", kind, Uuid::new_v4());
        let sample_track = Arc::new(TrackLocalStaticSample::new(
            kind.codec_capability(),
            id.clone(),
            LOCAL_STREAM_ID.to_string(),
        ));

        Self {
            id,
            kind,
            label: label.to_string(),
            device_id: device_id.to_string(),
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            sample_track,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Stop capturing. Stopping twice is harmless.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            tracing::debug!(track_id = %self.id, kind = %self.kind, "Local track stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Sample sink the capture side writes into
    pub fn sample_track(&self) -> Arc<TrackLocalStaticSample> {
        self.sample_track.clone()
    }

    /// The track as attached to a peer connection sender
    pub fn rtc_track(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        self.sample_track.clone()
    }
}

impl fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("enabled", &self.is_enabled())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// The local (audio, video) pair; each slot can be swapped on its own.
#[derive(Debug, Clone, Default)]
pub struct TrackSet {
    audio: Option<Arc<LocalTrack>>,
    video: Option<Arc<LocalTrack>>,
}

impl TrackSet {
    pub fn new(audio: Option<Arc<LocalTrack>>, video: Option<Arc<LocalTrack>>) -> Self {
        Self { audio, video }
    }

    pub fn get(&self, kind: MediaKind) -> Option<&Arc<LocalTrack>> {
        match kind {
            MediaKind::Audio => self.audio.as_ref(),
            MediaKind::Video => self.video.as_ref(),
        }
    }

    /// Put `track` in its kind's slot and hand back the previous occupant
    pub fn replace(&mut self, track: Arc<LocalTrack>) -> Option<Arc<LocalTrack>> {
        match track.kind() {
            MediaKind::Audio => self.audio.replace(track),
            MediaKind::Video => self.video.replace(track),
        }
    }

    pub fn take(&mut self, kind: MediaKind) -> Option<Arc<LocalTrack>> {
        match kind {
            MediaKind::Audio => self.audio.take(),
            MediaKind::Video => self.video.take(),
        }
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Arc<LocalTrack>> {
        self.audio.iter().chain(self.video.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && self.video.is_none()
    }

    pub fn stop_all(&self) {
        for track in self.tracks() {
            track.stop();
        }
    }
}

/// Device and capture provider (camera, microphone, screen).
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Capture a track set for the given selector.
    async fn acquire(&self, selector: &SourceSelector) -> Result<TrackSet>;

    /// List capture devices. Only meaningful after a successful unconstrained
    /// acquisition granted access.
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_returns_previous_track() {
        let first = Arc::new(LocalTrack::new(MediaKind::Video, "Front", "cam-1"));
        let second = Arc::new(LocalTrack::new(MediaKind::Video, "Back", "cam-2"));
        let mut set = TrackSet::new(None, Some(first.clone()));

        let previous = set.replace(second.clone()).expect("Should return old track");
        assert_eq!(previous.id(), first.id());
        assert_eq!(set.get(MediaKind::Video).map(|t| t.id()), Some(second.id()));
        assert!(set.get(MediaKind::Audio).is_none());
    }

    #[test]
    fn test_stop_all_stops_every_track() {
        let set = TrackSet::new(
            Some(Arc::new(LocalTrack::new(MediaKind::Audio, "Mic", "mic-1"))),
            Some(Arc::new(LocalTrack::new(MediaKind::Video, "Cam", "cam-1"))),
        );
        set.stop_all();
        assert!(set.tracks().all(|t| t.is_stopped()));
    }

    #[test]
    fn test_selector_swapped_kind() {
        assert_eq!(SourceSelector::Screen.swapped_kind(), MediaKind::Video);
        assert_eq!(
            SourceSelector::Microphone("mic-1".into()).swapped_kind(),
            MediaKind::Audio
        );
        assert!(!SourceSelector::DefaultCamera.is_constrained());
    }
}
