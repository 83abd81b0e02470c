use anyhow::Result;
use clap::Parser;
use std::path::Path;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use epg_importer::{config::Config, database::Database, ingestor::ImportRunner};

#[derive(Parser)]
#[command(name = "epg-importer")]
#[command(version = "0.1.0")]
#[command(about = "Imports TV schedules from external providers into a local database")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Database URL (overrides config file)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("epg_importer={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting EPG importer v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load(Path::new(&cli.config))?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(database_url) = cli.database_url {
        config.database.url = database_url;
    }

    std::fs::create_dir_all(&config.import.temp_path)?;

    let db = Database::new(&config.database).await?;
    db.migrate().await?;

    let totals = ImportRunner::new(config, db).run().await?;
    info!(
        "Import finished: {} new channels, {} new programs",
        totals.new_channels, totals.new_programs
    );

    Ok(())
}
