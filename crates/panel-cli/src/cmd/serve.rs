use anyhow::{Context, Result};
use std::path::Path;

pub fn run(config: &Path, bind: &str) -> Result<i32> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(panel_server::serve(config.to_path_buf(), bind))
        .with_context(|| format!("control panel on {bind} stopped"))?;
    Ok(0)
}
