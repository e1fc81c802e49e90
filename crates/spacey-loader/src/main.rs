// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! spacey-loader CLI - inspect how module names resolve

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use spacey_loader::{
    FsFetcher, LoadRecord, LoaderBuilder, LoaderConfig, LoaderError, Scope, Script, VERSION,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "spacey-loader",
    about = "Module name resolution for the Spacey loader",
    version = VERSION,
    author = "Pegasus Heavy Industries"
)]
struct Cli {
    /// Loader configuration (.json or .toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Normalize and locate module names
    Resolve {
        /// Names to resolve
        #[arg(required = true)]
        names: Vec<String>,

        /// Resolve relative to this module
        #[arg(short, long)]
        parent: Option<String>,
    },
    /// Print the known package versions as JSON
    Versions,
}

/// Resolution never runs module code.
fn no_scripts(script: &Script<'_>, _: &Scope) -> spacey_loader::Result<()> {
    Err(LoaderError::execution(
        script.name,
        "script execution is not available from the command line",
    ))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "spacey_loader=debug"
    } else {
        "spacey_loader=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = LoaderConfig::load(cli.config.as_deref())?;
    let root = std::env::current_dir()?;
    let loader = LoaderBuilder::new(no_scripts, FsFetcher::new(root))
        .config(config)
        .build()?;

    match cli.command {
        Command::Resolve { names, parent } => {
            for name in &names {
                let normalized = loader.normalize(name, parent.as_deref()).await?;
                let mut load = LoadRecord::new(normalized.clone());
                let address = loader.locate(&mut load).await?;
                println!(
                    "{} {} {}",
                    name.cyan(),
                    normalized.bold(),
                    address.dimmed()
                );
            }
            println!("{}", serde_json::to_string_pretty(&loader.versions())?);
        }
        Command::Versions => {
            println!("{}", serde_json::to_string_pretty(&loader.versions())?);
        }
    }
    Ok(())
}
