pub mod local;
pub mod messages;
pub mod transport;
pub mod ws;

pub use local::LocalRelayTransport;
pub use messages::{bye_reasons, msg_types, ClientSignal, SignalingMessage};
pub use transport::SignalingTransport;
pub use ws::WsTransport;
