pub mod api;
pub mod config;
pub mod error;
pub mod media;
pub mod models;
pub mod peer;
pub mod relay;
pub mod session;
pub mod signaling;
pub mod state;

pub use config::Config;
pub use error::{Error, Result};
pub use state::RelayState;
