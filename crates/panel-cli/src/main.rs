mod cmd;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "panel",
    about = "Minimal remote control panel: run configured shell actions from a browser or a webhook",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, global = true, env = "PANEL_CONFIG", default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP control panel
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
    },

    /// Validate the configuration file without starting anything
    Check,

    /// List the configured actions
    List {
        /// Output as JSON
        #[arg(long, short = 'j')]
        json: bool,
    },

    /// Run one action in the foreground and stream its output
    Run {
        /// Service name
        service: String,
        /// Action name within the service
        action: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Serve { bind } => cmd::serve::run(&cli.config, &bind),
        Commands::Check => cmd::check::run(&cli.config),
        Commands::List { json } => cmd::list::run(&cli.config, json),
        Commands::Run { service, action } => cmd::run::run(&cli.config, &service, &action),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            // Print the full error chain (anyhow's alternate Display)
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}
