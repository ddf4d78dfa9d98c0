//! Offline tool that builds and inspects planet variance tables.
//!
//! `terra-vartool build --level 12 --out earth.var` splits the procedural planet
//! configured in `config.ron` down to level 12 and writes the quantised table.
//! `terra-vartool inspect earth.var` prints its per-level summary.

mod build;
mod error;
mod inspect;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use terra_config::{CliArgs, Config};
use terra_geo::PlanetShape;
use terra_roam::VarianceTable;
use terra_terrain::{ProceduralSource, SurfaceParams};

use crate::error::ToolError;

#[derive(Parser, Debug)]
#[command(name = "terra-vartool", about = "Build and inspect variance tables")]
struct Cli {
    #[command(flatten)]
    args: CliArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Measure every node down to a level and write the table.
    Build {
        /// Deepest bintree level stored.
        #[arg(long, default_value_t = 12)]
        level: u8,

        /// Output file.
        #[arg(long, short)]
        out: PathBuf,
    },
    /// Print a summary of an existing table.
    Inspect {
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_dir = cli.args.config.clone().or_else(Config::default_dir);
    let mut config = match config_dir.as_deref() {
        Some(dir) => Config::load_or_create(dir).unwrap_or_else(|e| {
            eprintln!("Failed to load config: {e}, using defaults");
            Config::default()
        }),
        None => Config::default(),
    };
    config.apply_cli_overrides(&cli.args);

    let log_dir = config_dir.map(|d| d.join("logs"));
    terra_log::init_logging(log_dir.as_deref(), cfg!(debug_assertions), Some(&config));

    match run(&config, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "terra-vartool failed");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config, command: Command) -> Result<(), ToolError> {
    match command {
        Command::Build { level, out } => {
            config.validate()?;
            let planet = &config.planet;
            let shape = PlanetShape::new(planet.min_radius_m, planet.max_radius_m);
            let source = Arc::new(ProceduralSource::new(
                planet.seed,
                SurfaceParams {
                    sea_level: planet.sea_level,
                    color: planet.color,
                    clouds: planet.clouds,
                    night_lights: planet.night_lights,
                },
            ));
            tracing::info!(level, seed = planet.seed, "Building variance table");
            let table = build::build_table(shape, source, level)?;
            table.save(&out)?;
            tracing::info!(path = %out.display(), entries = table.len(), "Variance table written");
        }
        Command::Inspect { file } => {
            let table = VarianceTable::load(&file)?;
            println!("{}", file.display());
            print!("{}", inspect::summarize(&table));
        }
    }
    Ok(())
}
