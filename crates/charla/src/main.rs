// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Charla - a conversational automation backend for messaging channels.
//!
//! This is the binary entry point for the Charla worker.

use clap::{Parser, Subcommand};

mod adapters;
mod doctor;
mod serve;
mod shell;
mod worker;

/// Charla - a conversational automation backend for messaging channels.
#[derive(Parser, Debug)]
#[command(name = "charla", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the Charla worker (buffer, cleanup, and follow-up loops).
    Serve,
    /// Chat with the pipeline interactively from the terminal.
    Shell,
    /// Run diagnostic checks against the environment.
    Doctor,
    /// Print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match charla_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            charla_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Shell) => shell::run_shell(config).await,
        Some(Commands::Doctor) => doctor::run_doctor(&config).await,
        Some(Commands::Config) => {
            match toml::to_string_pretty(&config) {
                Ok(rendered) => {
                    println!("{rendered}");
                    Ok(())
                }
                Err(e) => Err(charla_core::CharlaError::Internal(format!(
                    "failed to render config: {e}"
                ))),
            }
        }
        None => {
            println!("charla: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
