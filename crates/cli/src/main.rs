//! Mindkeep CLI, the main entry point.
//!
//! Commands:
//! - `serve`    Start the HTTP gateway
//! - `chat`     Single-message or interactive chat
//! - `migrate`  Create the SQLite schema and provision owners
//! - `config`   Show, locate, validate or initialize configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "mindkeep",
    about = "Mindkeep: a conversational assistant that always answers",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Chat with the assistant
    Chat {
        /// Owner to chat as (defaults to `assistant.default_owner`)
        #[arg(short, long)]
        owner: Option<String>,

        /// Continue an existing conversation
        #[arg(short, long)]
        conversation: Option<String>,

        /// Title for a new conversation
        #[arg(short, long)]
        title: Option<String>,

        /// Send a single message instead of entering interactive mode
        message: Option<String>,
    },

    /// Create the database schema and provision owners
    Migrate {
        /// Owner id to provision (repeatable)
        #[arg(long = "owner")]
        owners: Vec<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration with secrets redacted
    Show,
    /// Print the config file path
    Path,
    /// Validate the config file
    Validate,
    /// Write a default config file if none exists
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Chat {
            owner,
            conversation,
            title,
            message,
        } => {
            commands::chat::run(commands::chat::ChatArgs {
                owner,
                conversation,
                title,
                message,
            })
            .await?
        }
        Commands::Migrate { owners } => commands::migrate::run(owners).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Init => commands::config_cmd::init().await?,
        },
    }

    Ok(())
}
