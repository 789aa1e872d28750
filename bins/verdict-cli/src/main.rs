mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "verdict-cli")]
#[command(about = "Verdict CLI - Operate the submission dispatcher by hand", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the worker pool's task queue is reachable
    Handshake,

    /// Ask the worker pool to publish a status report
    Probe,

    /// Dispatch one submission to the worker pool
    Dispatch {
        /// Submission id
        #[arg(short, long)]
        submission: u64,

        /// Submission result id holding the test cases
        #[arg(short, long)]
        result: u64,
    },

    /// Re-dispatch submissions still waiting in `received`
    RetryPending {
        /// Maximum number of submissions to look at
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Find the submission a worker acknowledgement refers to
    Resolve {
        /// Message id carried by the acknowledgement
        message_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Handshake => {
            commands::handshake().await?;
        }
        Commands::Probe => {
            commands::probe().await?;
        }
        Commands::Dispatch { submission, result } => {
            commands::dispatch(submission, result).await?;
        }
        Commands::RetryPending { limit } => {
            commands::retry_pending(limit).await?;
        }
        Commands::Resolve { message_id } => {
            commands::resolve(&message_id).await?;
        }
    }

    Ok(())
}
