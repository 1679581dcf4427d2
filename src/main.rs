//! optiflood CLI - optical flood mapping from a scene catalog

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use optiflood::core::FloodReport;
use optiflood::{FileCatalog, FloodConfig, FloodPipeline, HttpCatalog, SceneCatalog};

#[derive(Parser)]
#[command(name = "optiflood")]
#[command(author, version, about = "Optical flood mapping from multispectral time series", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Map flooded area for the configured AOI and period
    Run {
        /// TOML run configuration
        #[arg(short, long)]
        config: PathBuf,
        /// Scene catalog: a JSON(.gz) document or an http(s) endpoint
        #[arg(long)]
        catalog: String,
        /// Write the flood report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the baseline and flood windows derived from a configuration
    Windows {
        /// TOML run configuration
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Run {
            config,
            catalog,
            output,
        } => run(&config, &catalog, output.as_deref()),
        Commands::Windows { config } => windows(&config),
    }
}

fn load_config(path: &Path) -> Result<FloodConfig> {
    FloodConfig::from_file(path)
        .with_context(|| format!("failed to load configuration {}", path.display()))
}

fn open_catalog(location: &str, config: &FloodConfig) -> Result<Arc<dyn SceneCatalog>> {
    if location.starts_with("http://") || location.starts_with("https://") {
        let timeout = std::time::Duration::from_secs(config.catalog_timeout_secs);
        let catalog = HttpCatalog::new(location, timeout)
            .with_context(|| format!("failed to create catalog client for {}", location))?;
        Ok(Arc::new(catalog))
    } else {
        Ok(Arc::new(FileCatalog::new(location)))
    }
}

fn run(config_path: &Path, catalog: &str, output: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let catalog = open_catalog(catalog, &config)?;
    let pipeline = FloodPipeline::new(&config, catalog).context("invalid configuration")?;

    let start = Instant::now();
    let map = pipeline.run().context("flood mapping failed")?;
    log::info!("Completed in {:.2}s", start.elapsed().as_secs_f64());

    let report = FloodReport::from(&map);
    let json = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write report {}", path.display()))?;
            log::info!("Report written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn windows(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let validated = config.validate().context("invalid configuration")?;
    let windows = validated.windows;

    println!("baseline: {} ({} days)", windows.baseline, windows.baseline.days());
    println!("flood:    {} ({} days)", windows.flood, windows.flood.days());
    println!("query:    {}", windows.query_window());
    Ok(())
}
