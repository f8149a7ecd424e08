use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use webrtc::track::track_remote::TrackRemote;

use crate::media::MediaKind;

struct RemoteTrackInner {
    id: String,
    kind: MediaKind,
    stream_id: String,
    stopped: AtomicBool,
    packets: AtomicU64,
}

/// Display-side reference to an inbound track.
///
/// The connection owns the underlying receiver; whoever shows the track keeps
/// this handle and must `stop()` it on teardown.
#[derive(Clone)]
pub struct RemoteTrack {
    inner: Arc<RemoteTrackInner>,
}

impl RemoteTrack {
    pub fn new(id: &str, kind: MediaKind, stream_id: &str) -> Self {
        Self {
            inner: Arc::new(RemoteTrackInner {
                id: id.to_string(),
                kind,
                stream_id: stream_id.to_string(),
                stopped: AtomicBool::new(false),
                packets: AtomicU64::new(0),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> MediaKind {
        self.inner.kind
    }

    pub fn stream_id(&self) -> &str {
        &self.inner.stream_id
    }

    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// RTP packets drained so far
    pub fn packets_received(&self) -> u64 {
        self.inner.packets.load(Ordering::Relaxed)
    }

    fn record_packet(&self) {
        self.inner.packets.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("stream_id", &self.inner.stream_id)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Remote track reader - drains RTP from an inbound track until its display
/// handle is stopped or the connection goes away
pub struct RemoteTrackReader {
    remote_track: Arc<TrackRemote>,
    handle: RemoteTrack,
    running: AtomicBool,
}

impl RemoteTrackReader {
    pub fn new(remote_track: Arc<TrackRemote>, handle: RemoteTrack) -> Self {
        Self {
            remote_track,
            handle,
            running: AtomicBool::new(false),
        }
    }

    /// Start draining RTP packets
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return; // Already running
        }

        let remote_track = self.remote_track.clone();
        let handle = self.handle.clone();

        tokio::spawn(async move {
            while !handle.is_stopped() {
                match remote_track.read_rtp().await {
                    Ok((_packet, _attributes)) => handle.record_packet(),
                    Err(e) => {
                        if !handle.is_stopped() {
                            tracing::trace!(error = %e, "Error reading RTP from remote track");
                        }
                        break;
                    }
                }
            }

            tracing::debug!(
                track_id = %handle.id(),
                packets = handle.packets_received(),
                "Remote track reader stopped"
            );
        });
    }

    pub fn handle(&self) -> &RemoteTrack {
        &self.handle
    }
}
