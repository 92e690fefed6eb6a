use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use vesselrecon::io::{load_slices, write_result};
use vesselrecon::pipeline::run_reconstruction;
use vesselrecon::result::StructureStatus;
use vesselrecon::ReconstructionConfig;

/// Reconstruct vessel surfaces, centerlines and diameter markers from label masks
#[derive(Parser, Debug)]
#[command(name = "vesselrecon")]
#[command(about = "Reconstruct vessel geometry from a stack of segmentation masks")]
#[command(version)]
struct Cli {
    /// Directory containing slices.csv and the PNG masks it lists
    #[arg(short, long, value_name = "DIRECTORY")]
    input: PathBuf,

    /// TOML configuration file; defaults are used when omitted
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory for OBJ, CSV and JSON outputs
    #[arg(short, long, value_name = "DIRECTORY", default_value = "output")]
    output: PathBuf,

    /// Stop after this many seconds, keeping finished structures
    #[arg(long)]
    deadline: Option<f64>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}

fn run(cli: &Cli) -> anyhow::Result<bool> {
    let mut config = match &cli.config {
        Some(path) => ReconstructionConfig::from_toml_file(path)?,
        None => ReconstructionConfig::default(),
    };
    if let Some(secs) = cli.deadline {
        anyhow::ensure!(secs.is_finite() && secs >= 0.0, "deadline must be a non-negative number of seconds");
        config.deadline = Some(Duration::from_secs_f64(secs));
    }

    let slices = load_slices(&cli.input)?;
    let result = run_reconstruction(slices, &config)
        .with_context(|| format!("reconstruction of {} failed", cli.input.display()))?;
    write_result(&result, &cli.output)?;

    for warning in &result.warnings {
        warn!("{}", warning);
    }
    for s in &result.structures {
        match s.status {
            StructureStatus::Complete => {
                if let Some(m) = &s.metrics {
                    info!(
                        "{}: length {:.1} mm, tortuosity {:.3}, max diameter {:.1} mm",
                        s.name, m.length, m.tortuosity, m.max_diameter.diameter
                    );
                }
            }
            status => warn!("{}: {:?} ({})", s.name, status, s.reasons.join("; ")),
        }
    }
    Ok(!result.cancelled)
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(&cli) {
        Ok(true) => {}
        Ok(false) => {
            eprintln!("Warning: run was cancelled, results are partial");
            process::exit(2);
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}
