use anyhow::Result;
use argos::cli::prices::FetchOptions;
use argos::core::log::init_logging;
use argos::core::{Interval, Timeframe};
use clap::{CommandFactory, Parser, Subcommand};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for argos::AppCommand {
    fn from(cmd: Commands) -> argos::AppCommand {
        match cmd {
            Commands::Fetch {
                tokens,
                timeframe,
                interval,
                json,
            } => argos::AppCommand::Fetch(FetchOptions {
                tokens,
                timeframe,
                interval,
                json,
            }),
            Commands::Sweep => argos::AppCommand::Sweep,
            Commands::Usage => argos::AppCommand::Usage,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Fetch price series for one or more tokens
    Fetch {
        /// Token id, repeatable
        #[arg(short = 't', long = "token", required = true)]
        tokens: Vec<String>,
        /// Lookback window: 1h, 24h or 7d
        #[arg(long, default_value = "24h")]
        timeframe: Timeframe,
        /// Spacing between points: 15m, 1h, 4h or 1d
        #[arg(long, default_value = "1h")]
        interval: Interval,
        /// Print the series as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove expired cache entries and old usage records
    Sweep,
    /// Show upstream API usage against the configured limits
    Usage,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => argos::cli::setup::setup_at_path(path),
            None => argos::cli::setup::setup(),
        },
        Some(cmd) => argos::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
