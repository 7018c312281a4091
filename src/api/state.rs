//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::guard::{SessionBackend, SessionGuard};

/// Application state shared across all handlers.
pub struct AppState<B: SessionBackend> {
    pub config: Arc<ServerConfig>,
    /// Owner of the single Telegram connection.
    pub guard: SessionGuard<B>,
}

impl<B: SessionBackend> AppState<B> {
    pub fn new(config: ServerConfig, guard: SessionGuard<B>) -> Self {
        Self {
            config: Arc::new(config),
            guard,
        }
    }
}

// Manual impl: `B` itself need not be `Clone`.
impl<B: SessionBackend> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            guard: self.guard.clone(),
        }
    }
}
