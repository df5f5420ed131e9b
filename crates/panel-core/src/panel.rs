//! The control panel facade tying the active configuration to webhook run tracking.

use std::path::Path;
use std::sync::Arc;

use tokio::io::AsyncWrite;
use tracing::{error, info};

use crate::action::Action;
use crate::config::RawConfig;
use crate::debounce::{Debouncer, RunHandle};
use crate::error::Result;
use crate::exec::{self, RunStatus};
use crate::snapshot::{SharedSnapshot, Snapshot};

/// The control panel: active configuration plus webhook run bookkeeping.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
#[derive(Debug)]
pub struct ControlPanel {
    snapshot: SharedSnapshot,
    debouncer: Arc<Debouncer>,
}

impl ControlPanel {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            snapshot: SharedSnapshot::new(initial),
            debouncer: Debouncer::shared(),
        }
    }

    pub fn from_raw(raw: &RawConfig) -> Result<Self> {
        Ok(Self::new(Snapshot::from_raw(raw)?))
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::new(Snapshot::load(path)?))
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.current()
    }

    pub fn debouncer(&self) -> &Debouncer {
        &self.debouncer
    }

    /// Resolve `service`/`action` against the active configuration.
    pub fn resolve(&self, service: &str, action: &str) -> Result<Arc<Action>> {
        self.snapshot.current().registry.resolve_by_name(service, action)
    }

    /// Run `service`/`action` to completion, streaming output into `sink`.
    ///
    /// Lookup failures return before anything is spawned.
    pub async fn trigger<W>(&self, service: &str, action: &str, sink: &mut W) -> Result<RunStatus>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let action = self.resolve(service, action)?;
        exec::execute(&action, sink).await
    }

    /// Start the action bound to `secret` in the background and return at
    /// once. Output goes to the server's own stdout.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn trigger_webhook(&self, secret: &str) -> Result<RunHandle> {
        let action = self.snapshot.current().registry.resolve_by_secret(secret)?;
        let handle = self.debouncer.begin(secret, &action);

        let run = handle.clone();
        let debouncer = Arc::clone(&self.debouncer);
        tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            match exec::execute_cancelable(&action, &mut stdout, run.token()).await {
                Ok(status) => info!(
                    action = %action.identity(),
                    run = %run.id(),
                    status = %status,
                    "webhook run finished"
                ),
                Err(e) => error!(
                    action = %action.identity(),
                    run = %run.id(),
                    error = %e,
                    "webhook run failed"
                ),
            }
            debouncer.finish(&run);
        });

        Ok(handle)
    }

    /// Replace the active configuration. On error nothing changes.
    pub fn reload(&self, raw: &RawConfig) -> Result<Arc<Snapshot>> {
        self.snapshot.reload(raw)
    }

    pub fn reload_from(&self, path: &Path) -> Result<Arc<Snapshot>> {
        self.snapshot.reload_from(path)
    }

    /// Cancel every in-flight webhook run.
    pub fn shutdown(&self) {
        self.debouncer.shutdown();
    }
}
