use crate::config::Config;
use crate::pagination::session::SessionStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Live-preview sessions, keyed by session id. In-memory only.
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            sessions: SessionStore::default(),
        }
    }
}
