use std::sync::Arc;

use crate::config::Config;
use crate::relay::RoomRegistry;

/// Shared relay state
#[derive(Clone)]
pub struct RelayState {
    pub config: Arc<Config>,
    pub registry: Arc<RoomRegistry>,
}

impl RelayState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(RoomRegistry::new()),
        }
    }
}
