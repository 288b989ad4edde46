//! Builds the rental index file the matching API loads at startup.

use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use estate_matcher::config::save_rental_index;
use estate_matcher::error::{AppError, AppResult};
use estate_matcher::matching::{build_rental_index, ImageFingerprinter, MatchingConfig};

/// Rental index builder for the estate matcher
#[derive(Parser, Debug)]
#[clap(
    name = "build-index",
    about = "Normalize scraped rental listings and write the rental index"
)]
struct Cli {
    /// JSON file holding an array of raw scraped rental records
    #[clap(long)]
    input: PathBuf,

    /// Provider tag for records that do not carry a `provider` or `source` field
    #[clap(long)]
    provider: Option<String>,

    /// Where to write the index
    #[clap(long, env = "RENTAL_INDEX_PATH", default_value = "data/rental_index.json")]
    output: PathBuf,

    /// Key images by URL only instead of downloading them
    #[clap(long)]
    skip_images: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "estate_matcher=info,build_index=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match run(&cli).await {
        Ok(count) => {
            tracing::info!(rentals = count, output = %cli.output.display(), "Rental index built");
        }
        Err(e) => {
            tracing::error!("Failed to build rental index: {}", e);
            process::exit(1);
        }
    }
}

async fn run(cli: &Cli) -> AppResult<usize> {
    let records = read_records(&cli.input).await?;
    tracing::info!(records = records.len(), input = %cli.input.display(), "Records loaded");

    let config = MatchingConfig::from_env();
    let fingerprinter = if cli.skip_images {
        ImageFingerprinter::url_only(&config)
    } else {
        ImageFingerprinter::new(&config)?
    };

    let index = build_rental_index(&records, cli.provider.as_deref(), &fingerprinter).await;
    if index.is_empty() {
        return Err(AppError::BadRequest(
            "No records in the input could be normalized".to_string(),
        ));
    }

    save_rental_index(&cli.output, &index).await?;
    Ok(index.len())
}

async fn read_records(path: &Path) -> AppResult<Vec<Value>> {
    let bytes = tokio::fs::read(path).await?;
    match serde_json::from_slice::<Value>(&bytes)? {
        Value::Array(records) => Ok(records),
        _ => Err(AppError::BadRequest(format!(
            "{} must contain a JSON array of listings",
            path.display()
        ))),
    }
}
