//! Shared Application State

use crate::config::StubConfig;
use crate::models::ReceivedRequest;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub config: Arc<StubConfig>,
    /// Every request received so far, oldest first.
    pub received: Mutex<Vec<ReceivedRequest>>,
}

impl AppState {
    pub fn new(config: StubConfig) -> Self {
        Self {
            config: Arc::new(config),
            received: Mutex::new(Vec::new()),
        }
    }
}
