mod commands;
mod interactive;
mod shutdown;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use miflo_core::{init_logging, AppConfig};
use tokio_util::sync::CancellationToken;

use commands::migrate;
use shutdown::{supervise, Finished};

#[derive(Parser, Debug)]
#[command(name = "miflo", version)]
#[command(about = "miflo is a simple migration manager tool for SQLite, PostgreSQL and libSQL")]
struct Cli {
    /// Database connection string, overrides DATABASE_URL
    #[arg(long, global = true, value_name = "URL")]
    database_url: Option<String>,

    /// Directory holding the migrations folder, defaults to the current directory
    #[arg(long, global = true, value_name = "DIR")]
    project_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new migration
    Create {
        /// Migration name (letters and underscores only)
        name: String,

        /// Create the migrations folder without asking
        #[arg(long, short)]
        yes: bool,
    },

    /// List pending migrations
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply all pending migrations
    Up,

    /// Revert the last batch of migrations
    Revert,

    /// Show applied and pending migrations
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Environment configuration with command line overrides applied
    fn config(&self) -> Result<AppConfig> {
        let mut config = AppConfig::load()?;
        if let Some(url) = &self.database_url {
            config = config.with_database_url(url);
        }
        if let Some(dir) = &self.project_dir {
            config = config.with_project_dir(dir);
        }
        Ok(config)
    }
}

async fn dispatch(command: Commands, config: &AppConfig, cancel: &CancellationToken) -> Result<()> {
    match command {
        Commands::Create { name, yes } => migrate::create(config, &name, yes).await,
        Commands::List { json } => migrate::list(config, json).await,
        Commands::Up => migrate::up(config, cancel).await,
        Commands::Revert => migrate::revert(config, cancel).await,
        Commands::Status { json } => migrate::status(config, json).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("{} failed to initialize logging: {}", style("warning:").yellow().bold(), e);
    }

    // up and revert get a chance to roll back before a second interrupt ends them
    let graceful = matches!(cli.command, Commands::Up | Commands::Revert);
    let cancel = CancellationToken::new();
    let work = dispatch(cli.command, &config, &cancel);

    match supervise(work, &cancel, graceful, shutdown::ctrl_c).await {
        Finished::Done(Ok(())) => ExitCode::SUCCESS,
        Finished::Done(Err(e)) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            ExitCode::FAILURE
        }
        Finished::Interrupted => {
            eprintln!("{}", style("interrupted").yellow().bold());
            // A pending terminal read would keep the runtime from shutting down
            std::process::exit(130);
        }
    }
}
