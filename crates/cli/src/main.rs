//! Compass CLI - the main entry point.
//!
//! Commands:
//! - `onboard`      - Write the default config and data directory
//! - `chat`         - Interactive or single-message conversation
//! - `classify`     - Show how a message would be routed, offline
//! - `specialists`  - List the specialist registry
//! - `escalations`  - List escalations awaiting a human
//! - `resolve`      - Resolve an escalation as a human expert
//! - `status`       - Show configuration and store counts

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "compass",
    about = "Compass - conversational routing and crisis escalation",
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
    /// Initialize configuration and data directory
    Onboard,

    /// Chat with Compass
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Continue an existing conversation
        #[arg(short, long)]
        conversation: Option<String>,

        /// User id recorded on the conversation
        #[arg(short, long, default_value = "anonymous")]
        user: String,

        /// Route every turn through the empathy-first path
        #[arg(long)]
        specialist_workflow: bool,
    },

    /// Classify a message and print the routing decision
    Classify {
        /// The message text
        text: String,

        /// Turn number to route as
        #[arg(short, long, default_value_t = 1)]
        turn: u32,

        /// Route through the empathy-first path
        #[arg(long)]
        specialist_workflow: bool,

        /// Print the decision as JSON
        #[arg(long)]
        json: bool,
    },

    /// List registered specialists
    Specialists,

    /// List escalations
    Escalations {
        /// Include resolved escalations
        #[arg(short, long)]
        all: bool,
    },

    /// Resolve an escalation
    Resolve {
        /// Escalation id
        id: String,

        /// Message sent to the user
        #[arg(short, long)]
        message: String,

        /// Who resolved it
        #[arg(short, long, default_value = "operator")]
        by: String,
    },

    /// Show system status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Chat {
            message,
            conversation,
            user,
            specialist_workflow,
        } => commands::chat::run(message, conversation, user, specialist_workflow).await?,
        Commands::Classify {
            text,
            turn,
            specialist_workflow,
            json,
        } => commands::classify::run(&text, turn, specialist_workflow, json)?,
        Commands::Specialists => commands::specialists::run()?,
        Commands::Escalations { all } => commands::escalations::list(all).await?,
        Commands::Resolve { id, message, by } => commands::escalations::resolve(id, message, by).await?,
        Commands::Status => commands::status::run().await?,
    }

    Ok(())
}
