pub mod negotiation;
pub mod room;

pub use negotiation::{IceCandidate, SdpKind, SessionDescription};
pub use room::RoomToken;
