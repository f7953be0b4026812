use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use quickcurrency::cli::setup::setup;
use quickcurrency::core::log::init_logging;

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

impl From<Commands> for quickcurrency::AppCommand {
    fn from(cmd: Commands) -> quickcurrency::AppCommand {
        match cmd {
            Commands::Convert {
                amount,
                from,
                to,
                refresh,
            } => quickcurrency::AppCommand::Convert {
                amount,
                from,
                to,
                refresh,
            },
            Commands::Popular => quickcurrency::AppCommand::Popular,
            Commands::Rates => quickcurrency::AppCommand::Rates,
            Commands::Watch => quickcurrency::AppCommand::Watch,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Convert an amount between two currencies
    Convert {
        /// Amount to convert
        #[arg(allow_negative_numbers = true)]
        amount: f64,
        /// Currency code to convert from, e.g. USD
        from: String,
        /// Currency code to convert to, e.g. EUR
        to: String,
        /// Fetch fresh rates before converting
        #[arg(short, long)]
        refresh: bool,
    },
    /// Display rates for the popular currency pairs
    Popular,
    /// Display all known currencies against the base currency
    Rates,
    /// Keep the popular rates on screen, refreshing periodically
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(cmd) => quickcurrency::run_command(cmd.into(), cli.config_path.as_deref()).await,
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
