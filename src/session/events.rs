use tokio::sync::mpsc;

use crate::error::Error;
use crate::media::{DeviceInfo, RemoteTrack, SourceSelector};
use crate::peer::{ConnectionState, LinkEvent};
use crate::signaling::SignalingMessage;

/// Everything a session reacts to, in the one order it is processed
#[derive(Debug)]
pub enum SessionEvent {
    /// Message from the relay
    Signal(SignalingMessage),
    /// Observation from the peer connection of `generation`
    Link { generation: u64, event: LinkEvent },
    /// Request from the UI
    Command(Command),
    /// The relay connection is gone
    TransportClosed(String),
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// UI commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join(String),
    JoinRandom,
    Leave,
    ToggleMic,
    ToggleCamera,
    SwitchSource(SourceSelector),
    SendChat(String),
    Shutdown,
}

/// UI-facing lifecycle callbacks.
///
/// Called from the session task, one at a time; implementations should hand
/// work off rather than block.
pub trait SessionObserver: Send + Sync {
    fn on_local_label_ready(&self, label: &str);

    /// `None` once the remote party is gone
    fn on_remote_label_changed(&self, label: Option<&str>);

    fn on_remote_stream_attached(&self, track: &RemoteTrack);

    fn on_remote_stream_detached(&self);

    fn on_chat_message(&self, text: &str);

    fn on_room_full(&self);

    fn on_devices_enumerated(&self, _devices: &[DeviceInfo]) {}

    fn on_connection_state(&self, _state: ConnectionState) {}

    fn on_error(&self, _error: &Error) {}
}
