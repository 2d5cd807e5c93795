use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use lightcurve_anomaly::config::PipelineConfig;
use lightcurve_anomaly::pipeline;
use lightcurve_anomaly::workspace::Workspace;

/// Light-curve anomaly detection pipeline
#[derive(Parser, Debug)]
#[command(name = "lightcurve-anomaly")]
#[command(about = "Flag unusual stellar light curves with two independent detectors")]
#[command(version)]
struct Args {
    /// TOML configuration file; defaults apply to anything it leaves out
    #[arg(short, long, env = "LIGHTCURVE_CONFIG")]
    config: Option<PathBuf>,

    /// Project root holding data/ and results/ (overrides paths.root)
    #[arg(short, long, env = "LIGHTCURVE_ROOT")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Clean raw curves and file them into train/test collections
    Process,
    /// Standardize and project both collections onto principal components
    Pca,
    /// Train the autoencoder and score by reconstruction error
    Autoencoder,
    /// Fit the isolation forest on projected curves and score the test set
    Iforest,
    /// Join both detectors' verdicts by star name
    Compare,
    /// Every stage in order
    Run,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = PipelineConfig::load(args.config.as_deref())?;
    let root = args.root.unwrap_or_else(|| config.paths.root.clone());
    let ws = Workspace::new(root);
    log::info!("Workspace: {}", ws.root().display());

    match args.command {
        Command::Process => {
            pipeline::process_raw(&config, &ws)?;
        }
        Command::Pca => {
            pipeline::run_pca(&config, &ws)?;
        }
        Command::Autoencoder => {
            pipeline::run_autoencoder(&config, &ws)?;
        }
        Command::Iforest => {
            pipeline::run_isolation_forest(&config, &ws)?;
        }
        Command::Compare => {
            pipeline::run_comparison(&ws)?;
        }
        Command::Run => {
            pipeline::run_all(&config, &ws)?;
        }
    }
    Ok(())
}
