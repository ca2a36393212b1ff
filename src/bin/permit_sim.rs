//! Headless Permit Market Runner
//!
//! Runs one compute-permit scenario and prints the results as JSON or text.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use compute_permit_sim::core::ScenarioConfig;
use compute_permit_sim::simulation::simulate;

/// Compute permit market simulation
#[derive(Parser, Debug)]
#[command(name = "permit_sim")]
#[command(about = "Simulate labs trading compute permits under audit enforcement")]
struct Args {
    /// Scenario file (.toml or .json); defaults are used without one
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the number of steps
    #[arg(long)]
    steps: Option<u32>,

    /// Override the number of labs
    #[arg(long)]
    agents: Option<u32>,

    /// Random seed for deterministic runs
    #[arg(long)]
    seed: Option<u64>,

    /// Also write the full JSON output to this file
    #[arg(long)]
    output: Option<PathBuf>,

    /// Output format: json or text
    #[arg(long, default_value = "text")]
    format: String,

    /// Log every lab decision and audit
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => match ScenarioConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => ScenarioConfig::default(),
    };
    if let Some(steps) = args.steps {
        config.steps = steps;
    }
    if let Some(agents) = args.agents {
        config.n_agents = agents;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    let output = match simulate(&config) {
        Ok(output) => output,
        Err(e) => {
            eprintln!("Simulation failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(path) = &args.output {
        if let Err(e) = output.write_json(path) {
            eprintln!("Failed to write '{}': {}", path.display(), e);
            return ExitCode::FAILURE;
        }
        tracing::info!("Wrote results to {}", path.display());
    }

    match args.format.as_str() {
        "json" => println!("{}", output.to_json()),
        "text" => println!("{}", output.summary()),
        _ => {
            eprintln!("Unknown format '{}', defaulting to text", args.format);
            println!("{}", output.summary());
        }
    }

    ExitCode::SUCCESS
}
