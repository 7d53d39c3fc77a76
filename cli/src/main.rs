// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # storage-node CLI
//!
//! `storage-node serve` loads a node manifest and runs the HTTP surface
//! described in `storage_node_core::http`; `storage-node config` helps
//! produce and validate that manifest.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use storage_node_cli::config::{default_config_path, load_manifest, sample_manifest_yaml};
use storage_node_cli::serve;

#[derive(Parser)]
#[command(name = "storage-node")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the node configuration manifest (overrides discovery).
    #[arg(short, long, global = true, env = "STORAGE_NODE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, env = "STORAGE_NODE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the node: bind the HTTP surface and serve invocations until shut down.
    Serve,
    /// Manifest inspection and scaffolding.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Parse and validate a manifest without starting the node.
    Validate,
    /// Print a sample manifest to stdout.
    Generate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Serve => {
            let config_path = cli.config.unwrap_or_else(default_config_path);
            let manifest = load_manifest(&config_path)?;
            serve::run(manifest).await
        }
        Commands::Config(ConfigCommand::Validate) => {
            let config_path = cli.config.unwrap_or_else(default_config_path);
            load_manifest(&config_path)?;
            println!("{} is valid", config_path.display());
            Ok(())
        }
        Commands::Config(ConfigCommand::Generate) => {
            print!("{}", sample_manifest_yaml());
            Ok(())
        }
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().or_else(|_| tracing_subscriber::EnvFilter::try_new(level)).context("failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
