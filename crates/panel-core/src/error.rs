use thiserror::Error;

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("service '{0}' is not configured correctly: expected an object of actions")]
    InvalidService(String),

    #[error("invalid action '{service}/{action}': {reason}")]
    InvalidAction {
        reason: String,
        service: String,
        action: String,
    },

    #[error("webhook secret is declared by both '{first}' and '{second}'")]
    DuplicateWebhook { first: String, second: String },

    #[error("unknown service: {0}")]
    ServiceNotFound(String),

    #[error("unknown action '{action}' in service '{service}'")]
    ActionNotFound { service: String, action: String },

    #[error("webhook not found")]
    WebhookNotFound,

    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PanelError {
    pub(crate) fn invalid_action(
        reason: impl Into<String>,
        service: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self::InvalidAction {
            reason: reason.into(),
            service: service.into(),
            action: action.into(),
        }
    }

    /// True for failures that reject a configuration load or reload.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_)
                | Self::InvalidService(_)
                | Self::InvalidAction { .. }
                | Self::DuplicateWebhook { .. }
                | Self::Io(_)
                | Self::Json(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ServiceNotFound(_) | Self::ActionNotFound { .. } | Self::WebhookNotFound
        )
    }
}

pub type Result<T> = std::result::Result<T, PanelError>;
