use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// ActionKind
// ---------------------------------------------------------------------------

/// What an action actually runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// A command string handed verbatim to `sh -c`.
    Inline { command: String },
    /// A script run through `bash` from inside `working_dir`.
    Script { working_dir: PathBuf, script: String },
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Inline { .. } => "inline",
            ActionKind::Script { .. } => "script",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// A single runnable unit belonging to one service.
///
/// Actions are built once by [`crate::registry::Registry::build`] and never
/// mutated afterwards; a reload produces fresh values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    identity: String,
    service: String,
    name: String,
    pub kind: ActionKind,
    pub webhook: Option<String>,
    pub allow_parallel_execution: bool,
}

impl Action {
    pub fn new(service: &str, name: &str, kind: ActionKind) -> Self {
        Self {
            identity: format!("{service}/{name}"),
            service: service.to_string(),
            name: name.to_string(),
            kind,
            webhook: None,
            allow_parallel_execution: false,
        }
    }

    /// Builder: attach a webhook secret. Empty secrets are ignored.
    pub fn with_webhook(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        self.webhook = if secret.is_empty() { None } else { Some(secret) };
        self
    }

    /// Builder: allow overlapping webhook runs.
    pub fn with_parallel_execution(mut self, allow: bool) -> Self {
        self.allow_parallel_execution = allow;
        self
    }

    /// `"<service>/<action>"`, unique within a registry.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn summary(&self) -> ActionSummary {
        ActionSummary {
            identity: self.identity.clone(),
            service: self.service.clone(),
            action: self.name.clone(),
            kind: self.kind.as_str(),
            has_webhook: self.webhook.is_some(),
            allow_parallel_execution: self.allow_parallel_execution,
        }
    }
}

/// Listing view of an action. Never carries the webhook secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionSummary {
    pub identity: String,
    pub service: String,
    pub action: String,
    pub kind: &'static str,
    pub has_webhook: bool,
    pub allow_parallel_execution: bool,
}
