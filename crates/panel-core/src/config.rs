use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

pub const DEFAULT_USER: &str = "admin";

// ---------------------------------------------------------------------------
// RawConfig
// ---------------------------------------------------------------------------

/// The config document as read from disk, before any validation.
///
/// `services` stays a generic JSON tree; [`crate::registry::Registry::build`]
/// turns it into typed actions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub services: Value,
}

impl RawConfig {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::parse(&data)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.user, &self.password)
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Basic-auth credentials for the operator endpoints.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    /// An empty user falls back to [`DEFAULT_USER`].
    pub fn new(user: &str, password: &str) -> Self {
        let user = if user.is_empty() { DEFAULT_USER } else { user };
        Self {
            user: user.to_string(),
            password: password.to_string(),
        }
    }

    /// Constant-time check of a supplied user/password pair.
    pub fn verify(&self, user: &str, password: &str) -> bool {
        let user_ok = crate::registry::constant_time_eq(self.user.as_bytes(), user.as_bytes());
        let pass_ok =
            crate::registry::constant_time_eq(self.password.as_bytes(), password.as_bytes());
        user_ok & pass_ok
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}
