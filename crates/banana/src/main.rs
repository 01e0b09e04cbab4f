// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Banana - preset-driven image generation for chat.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod check;
mod inspect;
mod shell;

use std::path::PathBuf;

use banana_config::BananaConfig;
use clap::{Parser, Subcommand};
use colored::Colorize;

/// Banana - preset-driven image generation for chat.
#[derive(Parser, Debug)]
#[command(name = "banana", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate configuration and report provider, preset, and storage status.
    Check {
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
    /// List preset triggers and their definitions.
    Presets,
    /// Resolve an invocation against the presets and print the request.
    Resolve {
        /// Invocation text, e.g. `bnn a cat --ar 16:9`.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        text: Vec<String>,
    },
    /// Chat with the bot from the terminal.
    Shell {
        /// Participant id used for the local user.
        #[arg(long, default_value = "console")]
        user: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref());
    init_tracing(&config.common.log_level);

    let result = match cli.command {
        Some(Commands::Check { plain }) => check::run_check(&config, plain).await,
        Some(Commands::Presets) => inspect::print_presets(&config),
        Some(Commands::Resolve { text }) => inspect::print_resolution(&config, &text.join(" ")),
        Some(Commands::Shell { user }) => shell::run_shell(&config, user).await,
        None => {
            println!("banana: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{}: {e}", "error".red());
        std::process::exit(1);
    }
}

fn load_config(path: Option<&std::path::Path>) -> BananaConfig {
    let loaded = match path {
        Some(path) => banana_config::load_and_validate_path(path),
        None => banana_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            banana_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("banana={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn resolve_takes_flags_verbatim() {
        let cli = Cli::try_parse_from(["banana", "resolve", "bnn", "cat", "--ar", "16:9"]).unwrap();
        match cli.command {
            Some(Commands::Resolve { text }) => assert_eq!(text.join(" "), "bnn cat --ar 16:9"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["banana", "check", "--config", "/tmp/banana.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/banana.toml")));
    }
}
