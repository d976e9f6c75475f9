//! hyperlpr - recognize license plates in an image

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use hyperlpr::config::{load_config, AppConfig, DetectLevel};
use hyperlpr::{storage, LicensePlateCatcher};

/// Recognize Chinese license plates in an image
#[derive(Parser, Debug)]
#[command(name = "hyperlpr")]
#[command(about = "Detect and recognize license plates in an image")]
struct Args {
    /// Image to process
    image: PathBuf,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Detector resolution: low (320) or high (640)
    #[arg(long)]
    detect_level: Option<DetectLevel>,

    /// Include plate vertices in the output
    #[arg(long)]
    full: bool,

    /// Model root folder
    #[arg(long)]
    models: Option<PathBuf>,

    /// Never download missing models
    #[arg(long)]
    offline: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    // Logs go to stderr so JSON output stays clean
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let mut config = resolve_config(args.config.as_ref())?;
    if let Some(level) = args.detect_level {
        config.inference.detect_level = level;
    }
    if args.full {
        config.inference.full_result = true;
    }
    if let Some(folder) = args.models {
        config.models.folder = Some(folder);
    }
    if args.offline {
        config.models.offline = true;
    }

    let mut catcher = LicensePlateCatcher::new(&config)?;
    let results = catcher
        .run_file(&args.image)
        .with_context(|| format!("Failed to process {:?}", args.image))?;
    info!("Found {} plate(s) in {:?}", results.len(), args.image);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    for result in &results {
        let [x1, y1, x2, y2] = result.bounding_box();
        println!(
            "{}\t{:.3}\t{}\t[{}, {}, {}, {}]",
            result.code(),
            result.confidence(),
            result.plate_type().display_name(),
            x1,
            y1,
            x2,
            y2
        );
    }

    Ok(())
}

/// Explicit config file, else the default one if present, else built-in defaults
fn resolve_config(explicit: Option<&PathBuf>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        return load_config(path).with_context(|| format!("Failed to load config {:?}", path));
    }

    match storage::default_config_path() {
        Ok(path) if path.exists() => load_config(&path)
            .with_context(|| format!("Failed to load config {:?}", path)),
        Ok(_) => Ok(AppConfig::default()),
        Err(e) => {
            warn!("No config directory available: {}", e);
            Ok(AppConfig::default())
        }
    }
}
