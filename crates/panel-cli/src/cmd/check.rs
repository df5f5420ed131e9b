use anyhow::{Context, Result};
use panel_core::snapshot::Snapshot;
use std::path::Path;

/// Load and validate `config` exactly as `serve` and `/reload` would.
pub fn run(config: &Path) -> Result<i32> {
    let snapshot =
        Snapshot::load(config).with_context(|| format!("{} is not valid", config.display()))?;
    let registry = &snapshot.registry;
    println!(
        "ok: {} actions across {} services, {} webhooks",
        registry.action_count(),
        registry.services().count(),
        registry.webhooks().count(),
    );
    Ok(0)
}
