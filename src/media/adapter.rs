use std::sync::Arc;

use crate::error::{Error, Result};
use crate::media::{DeviceInfo, LocalTrack, MediaKind, MediaSource, SourceSelector, TrackSet};

/// Owns the local track set and the mic/camera toggles.
///
/// The toggles are independent of the connection state: they survive hot
/// swaps and connection rebuilds, and reset only when the local media is
/// stopped (leaving the room).
pub struct MediaSourceAdapter {
    source: Arc<dyn MediaSource>,
    tracks: Option<TrackSet>,
    muted: bool,
    video_enabled: bool,
    access_granted: bool,
}

impl MediaSourceAdapter {
    pub fn new(source: Arc<dyn MediaSource>) -> Self {
        Self {
            source,
            tracks: None,
            muted: false,
            video_enabled: true,
            access_granted: false,
        }
    }

    /// Unconstrained acquisition (default camera and microphone), followed by
    /// device enumeration. Enumeration failures are logged, not returned.
    pub async fn acquire_initial(&mut self) -> Result<Vec<DeviceInfo>> {
        let tracks = self.source.acquire(&SourceSelector::DefaultCamera).await?;
        if tracks.is_empty() {
            return Err(Error::MediaAcquisition("no tracks captured".to_string()));
        }

        if let Some(previous) = self.tracks.replace(tracks) {
            previous.stop_all();
        }
        self.access_granted = true;
        self.apply_toggles();

        match self.source.enumerate().await {
            Ok(devices) => Ok(devices),
            Err(e) => {
                tracing::warn!(error = %e, "Device enumeration failed");
                Ok(Vec::new())
            }
        }
    }

    pub fn tracks(&self) -> Option<&TrackSet> {
        self.tracks.as_ref()
    }

    /// Acquire `selector` and swap the affected kind into the current set.
    ///
    /// Returns the newly installed tracks so the caller can hand them to the
    /// outbound senders. Replaced tracks are stopped.
    pub async fn switch_source(
        &mut self,
        selector: &SourceSelector,
    ) -> Result<Vec<Arc<LocalTrack>>> {
        if self.tracks.is_none() {
            return Err(Error::InvalidState("no local media to switch".to_string()));
        }
        if selector.is_constrained() && !self.access_granted {
            return Err(Error::MediaAcquisition(
                "device access not granted yet".to_string(),
            ));
        }

        let mut acquired = self.source.acquire(selector).await?;
        let kind = selector.swapped_kind();
        let Some(track) = acquired.take(kind) else {
            acquired.stop_all();
            return Err(Error::MediaAcquisition(format!(
                "source produced no {} track",
                kind
            )));
        };
        // Only the selected kind is swapped; anything else captured alongside
        // is released right away.
        acquired.stop_all();

        match kind {
            MediaKind::Audio => track.set_enabled(!self.muted),
            MediaKind::Video => track.set_enabled(self.video_enabled),
        }

        if let Some(set) = self.tracks.as_mut() {
            if let Some(previous) = set.replace(track.clone()) {
                previous.stop();
            }
        }

        tracing::info!(
            kind = %kind,
            label = %track.label(),
            device_id = %track.device_id(),
            "Local source switched"
        );

        Ok(vec![track])
    }

    /// Flip the microphone; returns whether it is now muted
    pub fn toggle_mic(&mut self) -> bool {
        self.muted = !self.muted;
        self.apply_toggles();
        self.muted
    }

    /// Flip the camera; returns whether video is now enabled
    pub fn toggle_camera(&mut self) -> bool {
        self.video_enabled = !self.video_enabled;
        self.apply_toggles();
        self.video_enabled
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_video_enabled(&self) -> bool {
        self.video_enabled
    }

    /// Stop every local track and reset the toggles.
    pub fn stop_all(&mut self) {
        if let Some(tracks) = self.tracks.take() {
            tracks.stop_all();
        }
        self.muted = false;
        self.video_enabled = true;
    }

    fn apply_toggles(&self) {
        if let Some(tracks) = &self.tracks {
            if let Some(audio) = tracks.get(MediaKind::Audio) {
                audio.set_enabled(!self.muted);
            }
            if let Some(video) = tracks.get(MediaKind::Video) {
                video.set_enabled(self.video_enabled);
            }
        }
    }
}
