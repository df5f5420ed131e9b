use anyhow::{Context, Result};
use panel_core::{ControlPanel, RunStatus};
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Run `service`/`action` in the foreground. The process exit code becomes
/// ours; a run without one (signal) maps to 1.
pub fn run(config: &Path, service: &str, action: &str) -> Result<i32> {
    let panel = ControlPanel::load(config)
        .with_context(|| format!("failed to load {}", config.display()))?;

    let rt = tokio::runtime::Runtime::new()?;
    let status = rt.block_on(async {
        let mut stdout = tokio::io::stdout();
        let status = panel.trigger(service, action, &mut stdout).await;
        stdout.flush().await?;
        anyhow::Ok(status?)
    })?;

    tracing::info!(service, action, status = %status, "run finished");
    Ok(match status {
        RunStatus::Exited { code: Some(code) } => code,
        _ => {
            eprintln!("[{status}]");
            1
        }
    })
}
