pub mod controller;
pub mod events;
pub mod handle;
pub mod peer_session;

pub use controller::{SessionController, SessionSettings};
pub use events::{Command, EventReceiver, EventSender, SessionEvent, SessionObserver};
pub use handle::SessionHandle;
pub use peer_session::{NegotiationRole, PeerSession, ReleasedPeer};

/// The ordered queue a session and its transport share
pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}
