mod cli;

use clap::{Parser, Subcommand};
use clap_verbosity_flag::{LogLevel, Verbosity};
use macros_rs::fmt::crashln;
use syncctl::{config::Config, helpers};

#[derive(Copy, Clone, Debug, Default)]
struct NoneLevel;
impl LogLevel for NoneLevel {
    fn default() -> Option<log::Level> {
        None
    }
}

/// Run the playlist-sync service in the background
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[clap(flatten)]
    verbose: Verbosity<NoneLevel>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the service unless it is already running
    #[command(visible_alias = "up")]
    Start,
    /// Stop the service, killing it if it does not exit in time
    #[command(visible_alias = "kill")]
    Stop,
    /// Stop then start the service
    Restart,
    /// Show whether the service is running
    #[command(visible_alias = "info")]
    Status {
        /// Format output
        #[arg(long, value_enum, default_value_t = cli::Format::Default)]
        format: cli::Format,
    },
    /// Show the end of the service log
    Logs {
        #[arg(
            long,
            default_value_t = 15,
            help = "Number of lines to display from the end of the log file"
        )]
        lines: usize,
    },
}

fn main() {
    let cli = Cli::parse();
    let mut env = env_logger::Builder::new();
    env.filter_level(cli.verbose.log_level_filter()).init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => crashln!("{} {err}", *helpers::FAIL),
    };

    log::debug!("resolved configuration: {config:?}");

    match &cli.command {
        Commands::Start => cli::start(&config),
        Commands::Stop => cli::stop(&config),
        Commands::Restart => cli::restart(&config),
        Commands::Status { format } => cli::status(&config, *format),
        Commands::Logs { lines } => cli::logs(&config, *lines),
    }
}
