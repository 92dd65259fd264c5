use clap::Parser;
use env_logger::Env;
use log::{debug, info};
use std::path::PathBuf;

use magpie::bundler::Bundler;
use magpie::config::Config;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path (defaults to magpie.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the project root from the config file
    #[arg(short, long)]
    project_root: Option<PathBuf>,

    /// Dev mode: incremental rebuilds and the readable runtime shim
    #[arg(short, long)]
    dev: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    info!("Starting Magpie asset bundler");

    // Load configuration
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(project_root) = cli.project_root {
        config.project_root = project_root;
    }
    if cli.dev {
        config.dev = true;
    }
    debug!("Configuration: {:?}", config);

    // Create bundler and run
    let mut bundler = Bundler::new(config);
    bundler.bundle()?;

    info!("Bundle created successfully");

    Ok(())
}
