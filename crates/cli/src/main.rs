//! ctxpack CLI — the main entry point.
//!
//! Commands:
//! - `render`  — Pack a render request into a prompt
//! - `count`   — Count the tokens of a message list
//! - `init`    — Write the default config file
//! - `config`  — Show, locate, or validate configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "ctxpack",
    about = "ctxpack — fit a conversation into a model's context window",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a request (JSON file, or `-` for stdin) into a prompt
    Render {
        /// Path to a render request JSON file
        input: PathBuf,
    },

    /// Count the tokens of a JSON message list
    Count {
        /// Path to a JSON array of messages
        input: PathBuf,

        /// Tokenizer to count with (defaults to assembler.default_model)
        #[arg(short, long, env = "CTXPACK_MODEL")]
        model: Option<String>,

        /// Count raw contents without the chat template
        #[arg(long)]
        no_template: bool,
    },

    /// Write the default configuration file
    Init,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Validate the configuration
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so rendered output stays pipeable
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Render { input } => commands::render::run(&input).await?,
        Commands::Count {
            input,
            model,
            no_template,
        } => commands::count::run(&input, model, !no_template).await?,
        Commands::Init => commands::init::run().await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
        },
    }

    Ok(())
}
