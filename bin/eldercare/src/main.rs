mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "eldercare")]
#[command(about = "Multi-agent care coordination for elderly patients", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway and the periodic sweeps
    Gateway {
        /// Port to listen on (overrides config gateway.port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides config gateway.host)
        #[arg(long)]
        host: Option<String>,
    },

    /// Run one low-stock refill sweep and print the report
    Sweep,

    /// Talk to the assistant (interactive mode if no message is given)
    Chat {
        /// Patient the conversation is about
        #[arg(short, long)]
        patient: String,

        /// Message to send
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Show the audit trail, newest first
    Events {
        /// Only events for this patient
        #[arg(short, long)]
        patient: Option<String>,

        /// Only events of this type (e.g. EMERGENCY_VITALS)
        #[arg(short = 't', long = "type")]
        event_type: Option<String>,

        /// Maximum number of events
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Show configuration and collaborator status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Gateway { port, host } => {
            commands::gateway::run(host, port).await?;
        }
        Commands::Sweep => {
            commands::sweep::run().await?;
        }
        Commands::Chat { patient, message } => {
            commands::chat::run(patient, message).await?;
        }
        Commands::Events {
            patient,
            event_type,
            limit,
        } => {
            commands::events::run(patient, event_type, limit).await?;
        }
        Commands::Status => {
            commands::status::run().await?;
        }
    }

    Ok(())
}
