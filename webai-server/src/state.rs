use std::sync::Arc;
use webai_core::config::ConfigStore;
use webai_core::notify::Notifier;
use webai_core::ClientManager;

/// Shared handler state. Everything is Arc'd so the router clones stay cheap.
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<ClientManager>,
    pub config: Arc<ConfigStore>,
    pub notifier: Arc<dyn Notifier>,
}
