//! Land-cover Fetcher CLI application
//!
//! Command-line interface for composing Earth Engine images and downloading
//! Sentinel-2 and land-cover patches.

use std::process;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use landcover_fetcher::cli::{handle_auth, handle_compose, handle_patch, Cli, Commands};
use landcover_fetcher::config::AppConfig;
use landcover_fetcher::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();
    let config = AppConfig::load(cli.global.config.clone()).await?;

    init_logging(&cli, &config);

    info!("Land-cover Fetcher v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Auth(args) => {
            info!("Executing auth command");
            handle_auth(args, &config).await
        }
        Commands::Compose(args) => {
            info!("Executing compose command");
            handle_compose(args, &config).await
        }
        Commands::Patch(args) => {
            info!("Executing patch command");
            handle_patch(args, &config, cli.global.quiet).await
        }
    }
}

/// Initialize logging from CLI verbosity, falling back to the configured level
fn init_logging(cli: &Cli, config: &AppConfig) {
    let level = cli
        .log_level()
        .map(|level| level.to_string().to_lowercase())
        .unwrap_or_else(|| config.logging.level.clone());

    let mut filter = EnvFilter::from_default_env();
    match format!("landcover_fetcher={}", level).parse() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("Ignoring invalid log level '{}': {}", level, e),
    }

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose)
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
}
