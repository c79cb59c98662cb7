//! autoledger command-line tool
//!
//! Runs the startup schema pass against a database file and inspects the
//! result.

mod formatter;

use autoledger::config::{DEFAULT_DB_PATH, DEFAULT_MIGRATE_ATTEMPTS, DEFAULT_SLOW_THRESHOLD_MS};
use autoledger::{Database, ServicesBuilder, StoreConfig};
use clap::{Parser, Subcommand};
use formatter::{Formatter, OutputFormat};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// autoledger data core tool
#[derive(Parser, Debug)]
#[command(name = "autoledger")]
#[command(version, about = "autoledger data core tool")]
pub struct Args {
    /// Database file
    #[arg(long, default_value = DEFAULT_DB_PATH)]
    pub db: PathBuf,

    /// Use a private in-memory database instead of --db
    #[arg(long)]
    pub memory: bool,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    /// Attempts for the startup schema pass
    #[arg(long, default_value_t = DEFAULT_MIGRATE_ATTEMPTS)]
    pub migrate_attempts: u32,

    /// Slow-operation threshold in milliseconds. Set to 0 to disable.
    #[arg(long, default_value_t = DEFAULT_SLOW_THRESHOLD_MS)]
    pub slow_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Ensure the schema and print what changed
    Migrate,
    /// Print the live schema
    Inspect,
    /// Look up a plate in the placard registry
    Lookup {
        /// License plate
        plate: String,
    },
}

impl Args {
    /// Convert command-line arguments to store configuration.
    pub fn to_config(&self) -> StoreConfig {
        let config = if self.memory {
            StoreConfig::in_memory()
        } else {
            StoreConfig::new(&self.db)
        };
        let config = config.with_migrate_attempts(self.migrate_attempts);

        if self.slow_ms == 0 {
            config.without_slow_threshold()
        } else {
            config.with_slow_threshold(Duration::from_millis(self.slow_ms))
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing. Logs go to stderr so JSON output stays clean.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                let level = &args.log_level;
                format!("autoledger={level},autoledger_schema={level},autoledger_resilience={level}")
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let formatter = formatter::create_formatter(args.format);

    if let Err(e) = run(&args, &*formatter).await {
        eprintln!("{}", formatter.format_error(&e.to_string()));
        std::process::exit(1);
    }
}

async fn run(args: &Args, formatter: &dyn Formatter) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.to_config();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        location = %config.location,
        "opening database"
    );

    let database = Database::open(config).await?;

    match &args.command {
        Command::Migrate => {
            println!("{}", formatter.format_report(database.startup_report()));
        }
        Command::Inspect => {
            println!("{}", formatter.format_schema(&database.schema()?));
        }
        Command::Lookup { plate } => {
            let services = ServicesBuilder::new(database).build();
            let info = services.placards.lookup(plate).await?;
            println!("{}", formatter.format_placard(&info));
        }
    }

    Ok(())
}
