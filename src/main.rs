//! Savanna - CLI Entry Point
//!
//! Savanna-forest dynamics simulator.

use clap::{Parser, Subcommand};
use log::{info, warn};
use savanna::export::ExportSystem;
use savanna::{benchmark, Config, Dynamics};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "savanna")]
#[command(version)]
#[command(about = "Savanna-forest simulator with fire percolation and multi-vector seed dispersal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a new simulation
    Run {
        /// Configuration file (YAML)
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        /// Maximum number of timesteps
        #[arg(short, long, default_value = "1000")]
        steps: u64,

        /// Output directory
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,

        /// Quiet mode (minimal output)
        #[arg(short, long)]
        quiet: bool,
    },

    /// Run performance benchmark
    Benchmark {
        /// Number of steps
        #[arg(short, long, default_value = "100")]
        steps: u64,

        /// Cells per side
        #[arg(short, long, default_value = "200")]
        gridsize: usize,
    },

    /// Generate default configuration file
    Init {
        /// Output path
        #[arg(short, long, default_value = "config.yaml")]
        output: PathBuf,
    },
}

fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            steps,
            output,
            seed,
            quiet,
        } => run_simulation(config, steps, output, seed, quiet),

        Commands::Benchmark { steps, gridsize } => {
            init_logging("warn");
            run_benchmark(steps, gridsize)
        }

        Commands::Init { output } => {
            init_logging("info");
            generate_config(output)
        }
    }
}

fn run_simulation(
    config_path: PathBuf,
    steps: u64,
    output: PathBuf,
    seed: Option<u64>,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    // Load or create config
    let config = if config_path.exists() {
        Config::from_file(&config_path)?
    } else {
        Config::default()
    };
    init_logging(if quiet { "warn" } else { config.logging.log_level.as_str() });
    if config_path.exists() {
        info!("Loaded config from {:?}", config_path);
    } else {
        warn!("Config {:?} not found, using default configuration", config_path);
    }

    std::fs::create_dir_all(&output)?;

    let seed = seed.unwrap_or_else(rand::random);
    info!("Using seed: {}", seed);
    let mut dynamics = Dynamics::from_config(config.clone(), seed)?;

    println!("Starting simulation");
    println!("  Grid size: {0}x{0} (cellsize {1} m)", config.grid.gridsize, config.grid.cellsize);
    println!("  Initial tree cover: {:.3}", dynamics.tree_cover());
    println!("  Initial population: {}", dynamics.population());
    println!("  Max steps: {}", steps);
    println!();

    let state_csv = output.join("state.csv");
    ExportSystem::append_state_csv(&dynamics, &state_csv)?;

    let start = Instant::now();
    let stats_interval = config.logging.stats_interval;

    let cause = loop {
        if let Some(cause) = dynamics.termination_cause(steps) {
            break cause;
        }
        dynamics.update()?;
        ExportSystem::append_state_csv(&dynamics, &state_csv)?;

        if !quiet && dynamics.time % stats_interval == 0 {
            println!("{}", dynamics.stats.summary());
        }
    };

    let elapsed = start.elapsed();
    let steps_per_sec = dynamics.time as f64 / elapsed.as_secs_f64().max(f64::EPSILON);

    println!();
    println!("=== Simulation Complete ===");
    println!("Stopped: {}", cause);
    println!("Time: {:.2}s", elapsed.as_secs_f64());
    println!("Steps: {}", dynamics.time);
    println!("Speed: {:.1} steps/s", steps_per_sec);
    println!("Final tree cover: {:.3}", dynamics.tree_cover());
    println!("Final population: {}", dynamics.population());

    let manifest = ExportSystem::export_full_state(&mut dynamics, &output)?;
    println!("State series: {:?}", state_csv);
    println!("Land cover: {:?}", manifest.land_cover_file);
    println!("Trees: {:?}", manifest.trees_file);
    println!("Fire-free intervals: {:?}", manifest.fire_intervals_file);
    println!("Stats history: {:?}", manifest.stats_file);

    Ok(())
}

fn run_benchmark(steps: u64, gridsize: usize) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Savanna Benchmark ===");
    println!("Steps: {}", steps);
    println!("Grid: {0}x{0}", gridsize);
    println!();

    let result = benchmark(steps, gridsize)?;
    println!("{}", result);

    Ok(())
}

fn generate_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    config.save(&output)?;
    println!("Configuration saved to: {:?}", output);
    Ok(())
}
