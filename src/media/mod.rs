pub mod adapter;
pub mod remote;
pub mod source;
pub mod synthetic;

pub use adapter::MediaSourceAdapter;
pub use remote::{RemoteTrack, RemoteTrackReader};
pub use source::{
    DeviceInfo, DeviceKind, LocalTrack, MediaKind, MediaSource, SourceSelector, TrackSet,
};
pub use synthetic::SyntheticMediaSource;
