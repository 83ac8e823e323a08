//! Sprocket CLI - drive a Sprocket agent from the terminal.
//!
//! The `sprocket` binary loads, lists and removes extensions and can run
//! chat commands against a local agent, with the terminal standing in for
//! the chat transport.

mod commands;
mod console;

use clap::{Parser, Subcommand};
use sprocket_core::Config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use commands::{list, load, run, scan, shell, unload};

/// Sprocket - chat-controlled automation with hot-loadable extensions
#[derive(Parser, Debug)]
#[command(name = "sprocket", author, version, about = "Sprocket - hot-loadable chat extensions")]
struct Args {
    /// Log level (trace, debug, info, warn, error), or a full filter directive
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Configuration file (defaults to ./sprocket.toml, then ~/.sprocket/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the external modules a source file imports
    Scan {
        /// Source file
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load (or replace) an extension from a local source file
    Load {
        /// Source file
        file: PathBuf,

        /// Canonical name to use instead of the declared name or file stem
        #[arg(long)]
        name: Option<String>,
    },

    /// Unload an extension by (fuzzy) name
    Unload {
        /// Extension name
        name: String,
    },

    /// List installed extensions
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Send one chat message, e.g. `sprocket run ".help"`
    Run {
        /// Message text
        text: String,

        /// File the message replies to
        #[arg(long)]
        attach: Option<PathBuf>,
    },

    /// Interactive session; prefix a line with `@file` to attach a file
    Shell,
}

fn init_tracing(level: Option<&str>) -> anyhow::Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("sprocket_core=info,info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref())?;

    let config = Config::load(args.config.as_deref())?;

    match args.command {
        Command::Scan { file, json } => scan::execute(&config, &file, json)?,
        Command::Load { file, name } => load::execute(config, &file, name).await?,
        Command::Unload { name } => unload::execute(config, &name).await?,
        Command::List { json } => list::execute(&config, json).await?,
        Command::Run { text, attach } => run::execute(config, &text, attach.as_deref()).await?,
        Command::Shell => shell::execute(config).await?,
    }

    Ok(())
}
