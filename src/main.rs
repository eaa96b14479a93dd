use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hqpool::{cli, config, core};

#[derive(Parser)]
#[command(name = "hqpool")]
#[command(version, about = "Market quote client pool with hot-standby failover", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (falls back to HQPOOL_* environment variables)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe configured hosts and list them by latency
    Rank {
        /// Only show the best N endpoints
        #[arg(long)]
        top: Option<usize>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Run calls through a pool backed by a simulated, failure-prone network
    Simulate {
        /// Number of quote calls to issue
        #[arg(long, default_value = "20")]
        calls: usize,

        /// Probability that a single call fails (0.0 - 1.0)
        #[arg(long, default_value = "0.2")]
        failure_rate: f64,

        /// Seed for the failure injection
        #[arg(long, default_value = "1")]
        seed: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Commands run one pool at a time; heartbeats and probes are light tasks
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let config = config::load_config(cli.config.as_deref())?;
    let core = core::Core::new(config)?;

    match cli.command {
        Commands::Rank { top, json } => {
            cli::commands::cmd_rank(&core, top, json).await?;
        }
        Commands::Simulate {
            calls,
            failure_rate,
            seed,
        } => {
            cli::commands::cmd_simulate(&core, calls, failure_rate, seed).await?;
        }
    }

    Ok(())
}
