mod cli;
mod server;
mod tools;

use anyhow::Result;
use clap::{Parser, Subcommand};
use groundwork::config::GroundworkConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "groundwork",
    version,
    about = "Budget-governed RAG server for health and wellness questions"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server
    Serve {
        /// Transport: "stdio" or "sse" (defaults to server.transport in config)
        #[arg(long)]
        transport: Option<String>,
    },
    /// Search the knowledge base and print ranked results
    Search {
        query: String,
        /// Maximum number of results
        #[arg(long, short = 'n')]
        max_results: Option<usize>,
        /// Restrict to these categories (repeatable)
        #[arg(long)]
        category: Vec<String>,
    },
    /// Ask a question and print the generated answer
    Ask {
        query: String,
        /// Health topic: fasting, nutrition, exercise, sleep, weight, hydration, mental_health, general
        #[arg(long)]
        query_type: Option<String>,
        /// Current goal (repeatable)
        #[arg(long)]
        goal: Vec<String>,
        /// Dietary restriction (repeatable)
        #[arg(long)]
        restriction: Vec<String>,
    },
    /// Show today's API usage and recent daily history
    Stats {
        /// Number of archived days to show
        #[arg(long, default_value_t = 7)]
        days: usize,
    },
    /// Check configuration and the usage database
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = GroundworkConfig::load()?;

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { transport } => {
            let transport = transport.unwrap_or_else(|| config.server.transport.clone());
            match transport.as_str() {
                "stdio" => server::serve_stdio(config).await?,
                "sse" | "http" => server::serve_sse(config).await?,
                other => anyhow::bail!("unknown transport `{other}` (expected stdio or sse)"),
            }
        }
        Command::Search {
            query,
            max_results,
            category,
        } => {
            cli::search::search(&config, &query, max_results, category).await?;
        }
        Command::Ask {
            query,
            query_type,
            goal,
            restriction,
        } => {
            cli::ask::ask(&config, &query, query_type.as_deref(), goal, restriction).await?;
        }
        Command::Stats { days } => {
            cli::stats::stats(&config, days)?;
        }
        Command::Doctor => {
            cli::doctor::doctor(&config)?;
        }
    }

    Ok(())
}
