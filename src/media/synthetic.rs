//! Synthetic capture devices for headless peers and tests.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use webrtc::media::Sample;

use crate::error::{Error, Result};
use crate::media::{
    DeviceInfo, DeviceKind, LocalTrack, MediaKind, MediaSource, SourceSelector, TrackSet,
};

const OPUS_FRAME: Duration = Duration::from_millis(20);

// TOC byte + padding for a 20 ms Opus silence frame
const OPUS_SILENCE: [u8; 3] = [0xf8, 0xff, 0xfe];

/// Fixed set of fake devices. Audio tracks carry Opus silence so the remote
/// side sees a live inbound track; video tracks stay idle.
pub struct SyntheticMediaSource {
    devices: Vec<DeviceInfo>,
    deny_access: bool,
}

impl SyntheticMediaSource {
    pub fn new() -> Self {
        Self {
            devices: vec![
                DeviceInfo {
                    device_id: "cam-front".to_string(),
                    label: "Front Camera".to_string(),
                    kind: DeviceKind::VideoInput,
                },
                DeviceInfo {
                    device_id: "cam-usb".to_string(),
                    label: "USB Camera".to_string(),
                    kind: DeviceKind::VideoInput,
                },
                DeviceInfo {
                    device_id: "mic-default".to_string(),
                    label: "Default Microphone".to_string(),
                    kind: DeviceKind::AudioInput,
                },
                DeviceInfo {
                    device_id: "mic-headset".to_string(),
                    label: "Headset Microphone".to_string(),
                    kind: DeviceKind::AudioInput,
                },
            ],
            deny_access: false,
        }
    }

    /// A source that behaves like a user refusing the permission prompt
    pub fn denying() -> Self {
        Self {
            deny_access: true,
            ..Self::new()
        }
    }

    fn device(&self, kind: DeviceKind, device_id: Option<&str>) -> Result<&DeviceInfo> {
        self.devices
            .iter()
            .filter(|d| d.kind == kind)
            .find(|d| device_id.map_or(true, |id| d.device_id == id))
            .ok_or_else(|| {
                Error::MediaAcquisition(format!(
                    "device {} unavailable",
                    device_id.unwrap_or("(default)")
                ))
            })
    }

    fn capture(&self, kind: MediaKind, device: &DeviceInfo) -> Arc<LocalTrack> {
        let track = Arc::new(LocalTrack::new(kind, &device.label, &device.device_id));
        if kind == MediaKind::Audio {
            spawn_silence(Arc::downgrade(&track));
        }
        track
    }
}

impl Default for SyntheticMediaSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaSource for SyntheticMediaSource {
    async fn acquire(&self, selector: &SourceSelector) -> Result<TrackSet> {
        if self.deny_access {
            return Err(Error::MediaAcquisition("permission denied".to_string()));
        }

        let (camera, microphone) = match selector {
            SourceSelector::DefaultCamera => (
                self.device(DeviceKind::VideoInput, None)?,
                self.device(DeviceKind::AudioInput, None)?,
            ),
            SourceSelector::Camera(id) => (
                self.device(DeviceKind::VideoInput, Some(id.as_str()))?,
                self.device(DeviceKind::AudioInput, None)?,
            ),
            SourceSelector::Microphone(id) => (
                self.device(DeviceKind::VideoInput, None)?,
                self.device(DeviceKind::AudioInput, Some(id.as_str()))?,
            ),
            SourceSelector::Screen => {
                let screen = Arc::new(LocalTrack::new(MediaKind::Video, "Screen", "screen"));
                return Ok(TrackSet::new(None, Some(screen)));
            }
        };

        Ok(TrackSet::new(
            Some(self.capture(MediaKind::Audio, microphone)),
            Some(self.capture(MediaKind::Video, camera)),
        ))
    }

    async fn enumerate(&self) -> Result<Vec<DeviceInfo>> {
        if self.deny_access {
            return Err(Error::MediaAcquisition("permission denied".to_string()));
        }
        Ok(self.devices.clone())
    }
}

fn spawn_silence(track: Weak<LocalTrack>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(OPUS_FRAME);
        loop {
            ticker.tick().await;
            let Some(track) = track.upgrade() else { break };
            if track.is_stopped() {
                break;
            }
            if !track.is_enabled() {
                continue;
            }

            let sample = Sample {
                data: Bytes::from_static(&OPUS_SILENCE),
                duration: OPUS_FRAME,
                ..Default::default()
            };
            if let Err(e) = track.sample_track().write_sample(&sample).await {
                tracing::trace!(error = %e, "Error writing silence sample");
            }
        }
    });
}
