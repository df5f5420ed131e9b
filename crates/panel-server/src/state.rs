use panel_core::ControlPanel;
use std::path::PathBuf;
use std::sync::Arc;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// Config file re-read by `/reload`.
    pub config_path: PathBuf,
    pub panel: Arc<ControlPanel>,
}

impl AppState {
    pub fn new(config_path: PathBuf, panel: ControlPanel) -> Self {
        Self {
            config_path,
            panel: Arc::new(panel),
        }
    }

    /// Load the config at `config_path` and build the initial state.
    pub fn load(config_path: PathBuf) -> panel_core::Result<Self> {
        let panel = ControlPanel::load(&config_path)?;
        Ok(Self::new(config_path, panel))
    }
}
