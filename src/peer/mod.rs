pub mod backend;
pub mod data_channel;
pub mod loopback;
pub mod manager;
pub mod rtc;

pub use backend::{DataLink, LinkEvent, LinkEvents, NetworkState, PeerBackend, PeerLink};
pub use data_channel::{ChannelOrigin, DataChannelBridge, CHAT_CHANNEL_LABEL};
pub use loopback::LoopbackNetwork;
pub use manager::{ConnectionManager, ConnectionState, NetworkOutcome};
pub use rtc::RtcBackend;
