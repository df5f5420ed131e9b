use crate::output::{print_json, print_table};
use anyhow::{Context, Result};
use panel_core::snapshot::Snapshot;
use panel_core::ActionSummary;
use std::path::Path;

pub fn run(config: &Path, json: bool) -> Result<i32> {
    let snapshot = Snapshot::load(config)
        .with_context(|| format!("failed to load {}", config.display()))?;
    let summaries: Vec<ActionSummary> = snapshot.registry.actions().map(|a| a.summary()).collect();

    if json {
        print_json(&summaries)?;
        return Ok(0);
    }

    if summaries.is_empty() {
        println!("No actions configured.");
        return Ok(0);
    }

    let rows: Vec<Vec<String>> = summaries
        .iter()
        .map(|s| {
            vec![
                s.identity.clone(),
                s.kind.to_string(),
                yes_no(s.has_webhook).to_string(),
                yes_no(s.allow_parallel_execution).to_string(),
            ]
        })
        .collect();
    print_table(&["ACTION", "KIND", "WEBHOOK", "PARALLEL"], &rows);
    Ok(0)
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}
