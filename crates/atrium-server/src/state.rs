use std::sync::Arc;

use atrium_runtime::{PluginManager, Runtime};

/// Shared state for all bridge handlers.
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<Runtime>,
    pub manager: Arc<PluginManager>,
}
