pub mod action;
pub mod config;
pub mod debounce;
pub mod error;
pub mod exec;
pub mod panel;
pub mod registry;
pub mod snapshot;

pub use action::{Action, ActionKind, ActionSummary};
pub use error::{PanelError, Result};
pub use exec::RunStatus;
pub use panel::ControlPanel;
