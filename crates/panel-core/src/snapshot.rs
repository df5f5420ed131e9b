//! The active configuration snapshot and its atomic reload.

use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::config::{Credentials, RawConfig};
use crate::error::Result;
use crate::registry::Registry;

/// Everything a request needs from the configuration, built in one go.
#[derive(Debug)]
pub struct Snapshot {
    pub credentials: Credentials,
    pub registry: Registry,
}

impl Snapshot {
    pub fn from_raw(raw: &RawConfig) -> Result<Self> {
        Ok(Self {
            credentials: raw.credentials(),
            registry: Registry::build(&raw.services)?,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_raw(&RawConfig::load(path)?)
    }
}

/// Holder for the active [`Snapshot`].
///
/// Readers clone the `Arc` and drop the lock straight away; `replace` swaps
/// the pointer, so nobody ever sees a half-built configuration.
#[derive(Debug)]
pub struct SharedSnapshot {
    current: RwLock<Arc<Snapshot>>,
}

impl SharedSnapshot {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    pub fn current(&self) -> Arc<Snapshot> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn replace(&self, next: Snapshot) {
        let next = Arc::new(next);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = next;
    }

    /// Build a snapshot from `raw` and install it. On error the active
    /// snapshot is left untouched.
    pub fn reload(&self, raw: &RawConfig) -> Result<Arc<Snapshot>> {
        let next = Snapshot::from_raw(raw)?;
        let actions = next.registry.action_count();
        self.replace(next);
        info!(actions, "configuration reloaded");
        Ok(self.current())
    }

    pub fn reload_from(&self, path: &Path) -> Result<Arc<Snapshot>> {
        self.reload(&RawConfig::load(path)?)
    }
}
