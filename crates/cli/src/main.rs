//! Stepwise CLI — inspect policies, tools, and configuration.
//!
//! Commands:
//! - `flows`   — Print an agent's policy graph (text or DOT)
//! - `tools`   — List the tools an agent offers the model
//! - `query`   — Run SQL through the query tool
//! - `config`  — Show, locate, validate, or initialize configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "stepwise",
    about = "Stepwise — step-based agent orchestration",
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
    /// Print the policy graph of an agent
    Flows {
        /// Agent kind (defaults to the configured agent)
        #[arg(short, long)]
        agent: Option<String>,

        /// Emit Graphviz DOT instead of a table
        #[arg(long)]
        dot: bool,
    },

    /// List tool definitions
    Tools {
        /// Only the tools of this agent kind
        #[arg(short, long)]
        agent: Option<String>,

        /// Print the full JSON definitions
        #[arg(long)]
        json: bool,
    },

    /// Run a SQL statement through the query tool
    Query {
        /// The statement to run
        sql: String,
    },

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
    /// Check the configuration and summarize it
    Validate,
    /// Write a default config file if none exists
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

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
        Commands::Flows { agent, dot } => commands::flows::run(agent, dot).await?,
        Commands::Tools { agent, json } => commands::tools::run(agent, json).await?,
        Commands::Query { sql } => commands::query::run(sql).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Init => commands::config_cmd::init().await?,
        },
    }

    Ok(())
}
