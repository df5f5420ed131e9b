//! Normalizes the loosely-typed `services` tree into typed actions and
//! resolves them by name or by webhook secret.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::action::{Action, ActionKind};
use crate::error::{PanelError, Result};

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// A named group of actions, keyed by action name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Service {
    pub name: String,
    pub actions: BTreeMap<String, Arc<Action>>,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    services: BTreeMap<String, Service>,
    /// Secret → action, in sorted (service, action) order.
    webhooks: Vec<(String, Arc<Action>)>,
}

impl Registry {
    /// Build a registry from the `services` value of a config document.
    ///
    /// `null` yields an empty registry. Any invalid service or action aborts
    /// the whole build.
    pub fn build(services: &Value) -> Result<Self> {
        let services = match services {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            other => {
                return Err(PanelError::InvalidConfig(format!(
                    "'services' must be an object, got {}",
                    type_name(other)
                )))
            }
        };

        let mut built = BTreeMap::new();
        for (service_name, service_value) in services {
            let Value::Object(actions) = service_value else {
                return Err(PanelError::InvalidService(service_name.clone()));
            };
            let mut service = Service {
                name: service_name.clone(),
                actions: BTreeMap::new(),
            };
            for (action_name, action_value) in actions {
                let action = normalize_action(service_name, action_name, action_value)?;
                service
                    .actions
                    .insert(action_name.clone(), Arc::new(action));
            }
            built.insert(service_name.clone(), service);
        }

        let webhooks = index_webhooks(&built)?;
        Ok(Self {
            services: built,
            webhooks,
        })
    }

    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.services.values()
    }

    /// Every action, sorted by service then action name.
    pub fn actions(&self) -> impl Iterator<Item = &Arc<Action>> {
        self.services.values().flat_map(|s| s.actions.values())
    }

    /// Actions reachable through a webhook, with their secrets, in the same
    /// order as [`Registry::actions`].
    pub fn webhooks(&self) -> impl Iterator<Item = (&str, &Arc<Action>)> {
        self.webhooks.iter().map(|(s, a)| (s.as_str(), a))
    }

    pub fn action_count(&self) -> usize {
        self.services.values().map(|s| s.actions.len()).sum()
    }

    pub fn resolve_by_name(&self, service: &str, action: &str) -> Result<Arc<Action>> {
        let svc = self
            .services
            .get(service)
            .ok_or_else(|| PanelError::ServiceNotFound(service.to_string()))?;
        svc.actions
            .get(action)
            .cloned()
            .ok_or_else(|| PanelError::ActionNotFound {
                service: service.to_string(),
                action: action.to_string(),
            })
    }

    /// Look up the action bound to `secret`.
    ///
    /// Every indexed secret is compared in constant time and the scan never
    /// exits early, so timing does not reveal which secret matched.
    pub fn resolve_by_secret(&self, secret: &str) -> Result<Arc<Action>> {
        let mut found = None;
        for (candidate, action) in &self.webhooks {
            if constant_time_eq(candidate.as_bytes(), secret.as_bytes()) && found.is_none() {
                found = Some(Arc::clone(action));
            }
        }
        found.ok_or(PanelError::WebhookNotFound)
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

fn normalize_action(service: &str, name: &str, value: &Value) -> Result<Action> {
    match value {
        Value::String(command) => Ok(Action::new(
            service,
            name,
            ActionKind::Inline {
                command: command.clone(),
            },
        )),
        Value::Object(settings) => normalize_script(service, name, settings),
        _ => Err(PanelError::invalid_action("unsupported shape", service, name)),
    }
}

fn normalize_script(service: &str, name: &str, settings: &Map<String, Value>) -> Result<Action> {
    let Some(path) = settings.get("path").and_then(Value::as_str) else {
        return Err(PanelError::invalid_action("missing path", service, name));
    };
    let Some(run) = settings.get("run").and_then(Value::as_str) else {
        return Err(PanelError::invalid_action("missing run", service, name));
    };

    let webhook = match settings.get("webhook") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(_) => {
            return Err(PanelError::invalid_action(
                "webhook must be a string",
                service,
                name,
            ))
        }
    };
    let parallel = match settings.get("allowParallelExecution") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => {
            return Err(PanelError::invalid_action(
                "allowParallelExecution must be a boolean",
                service,
                name,
            ))
        }
    };

    Ok(Action::new(
        service,
        name,
        ActionKind::Script {
            working_dir: path.into(),
            script: run.to_string(),
        },
    )
    .with_webhook(webhook)
    .with_parallel_execution(parallel))
}

fn index_webhooks(services: &BTreeMap<String, Service>) -> Result<Vec<(String, Arc<Action>)>> {
    let mut webhooks: Vec<(String, Arc<Action>)> = Vec::new();
    let mut owners: HashMap<&str, &str> = HashMap::new();
    for action in services.values().flat_map(|s| s.actions.values()) {
        let Some(secret) = action.webhook.as_deref() else {
            continue;
        };
        if let Some(first) = owners.insert(secret, action.identity()) {
            return Err(PanelError::DuplicateWebhook {
                first: first.to_string(),
                second: action.identity().to_string(),
            });
        }
        webhooks.push((secret.to_string(), Arc::clone(action)));
    }
    Ok(webhooks)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Compare two byte strings without short-circuiting on the first mismatch.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
