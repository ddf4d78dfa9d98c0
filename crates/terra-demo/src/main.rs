//! Headless fly-around that drives the planet engine frame by frame.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p terra-demo -- --frames 600` for a longer descent.

mod flight;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use terra_config::{CliArgs, Config};
use terra_planet::{EngineError, HeadlessBackend, PlanetEngine};
use terra_terrain::{ProceduralSource, SurfaceParams};
use tracing::info;

use crate::flight::FlightPath;

#[derive(Parser, Debug)]
#[command(name = "terra-demo", about = "Headless planet fly-around")]
struct Cli {
    #[command(flatten)]
    args: CliArgs,

    /// Frames to simulate.
    #[arg(long, default_value_t = 240)]
    frames: u32,

    /// Target frame time; the tile worker runs in the gaps.
    #[arg(long, default_value_t = 16)]
    frame_ms: u64,

    /// Sun movement per frame, in degrees of longitude.
    #[arg(long, default_value_t = 0.25)]
    sun_speed: f64,

    /// Log a stats line every this many frames.
    #[arg(long, default_value_t = 30)]
    report_every: u32,

    /// Check `config.ron` for changes every this many frames (0 disables).
    #[arg(long, default_value_t = 60)]
    reload_every: u32,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Resolve config directory
    let config_dir = cli.args.config.clone().or_else(Config::default_dir);
    let mut config = match config_dir.as_deref() {
        Some(dir) => Config::load_or_create(dir).unwrap_or_else(|e| {
            eprintln!("Failed to load config: {e}, using defaults");
            Config::default()
        }),
        None => Config::default(),
    };
    config.apply_cli_overrides(&cli.args);

    let log_dir = config_dir.as_ref().map(|d| d.join("logs"));
    terra_log::init_logging(log_dir.as_deref(), cfg!(debug_assertions), Some(&config));

    match fly(config, config_dir.as_deref(), &cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "Demo aborted");
            ExitCode::FAILURE
        }
    }
}

fn fly(mut config: Config, config_dir: Option<&Path>, cli: &Cli) -> Result<(), EngineError> {
    let planet = config.planet.clone();
    let source = Arc::new(ProceduralSource::new(
        planet.seed,
        SurfaceParams {
            sea_level: planet.sea_level,
            color: planet.color,
            clouds: planet.clouds,
            night_lights: planet.night_lights,
        },
    ));
    let mut backend = HeadlessBackend::new();
    let mut engine = PlanetEngine::from_config(&config, source, &mut backend)?;

    let path = FlightPath::descent(planet.min_radius_m, cli.frames);
    let frame_time = Duration::from_millis(cli.frame_ms);
    let mut sun = config.tiles.sun_longitude_degrees;
    let started = Instant::now();
    let mut fallbacks = 0;

    for frame in 0..path.frames {
        let frame_start = Instant::now();
        engine.set_viewpoint(path.camera(frame).viewpoint());
        let setup = engine.render_setup();

        backend.begin_frame();
        let drawn = engine.render(&mut backend);
        fallbacks += drawn.fallbacks;

        sun = (sun + cli.sun_speed).rem_euclid(360.0);
        engine.set_sun_longitude(sun);

        if cli.report_every > 0 && frame % cli.report_every == 0 {
            let tiles = engine.tile_stats();
            info!(
                frame,
                altitude = path.altitude(frame),
                live = setup.live_nodes,
                splits = setup.splits,
                merges = setup.merges,
                plane_tests = setup.plane_tests,
                triangles = drawn.triangles,
                binds = drawn.texture_binds,
                fallbacks = drawn.fallbacks,
                resident = engine.tiles().resident_count(),
                commits = tiles.commits,
                "Frame"
            );
        }

        if let Some(dir) = config_dir
            && cli.reload_every > 0
            && frame > 0
            && frame % cli.reload_every == 0
        {
            hot_reload(dir, &mut config, cli, &mut engine);
        }

        if let Some(rest) = frame_time.checked_sub(frame_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    let last = path.frames - 1;
    if let Some(key) = path.ground_tile(last, config.tiles.max_level.min(12)) {
        backend.begin_frame();
        let strips = engine.render_sector(key, &mut backend)?;
        info!(?key, strips, "Sector drawn under the camera");
    }

    let tiles = engine.tile_stats();
    info!(
        frames = path.frames,
        elapsed_ms = started.elapsed().as_millis() as u64,
        triangles = backend.triangles,
        uploads = backend.texture_uploads,
        uploaded_mb = backend.uploaded_bytes as f64 / (1024.0 * 1024.0),
        hits = tiles.hits,
        misses = tiles.misses,
        evictions = tiles.evictions,
        dropped = tiles.dropped,
        failures = tiles.failures,
        fallbacks,
        "Flight complete"
    );
    engine.close();
    Ok(())
}

/// Pick up edits to `config.ron` without restarting the flight.
fn hot_reload(dir: &Path, config: &mut Config, cli: &Cli, engine: &mut PlanetEngine) {
    let mut fresh = match config.reload(dir) {
        Ok(Some(fresh)) => fresh,
        Ok(None) => return,
        Err(err) => {
            tracing::warn!(%err, "Config reload failed, keeping current settings");
            return;
        }
    };
    fresh.apply_cli_overrides(&cli.args);
    if fresh == *config {
        return;
    }
    if fresh.planet != config.planet
        || fresh.tiles != config.tiles
        || fresh.sectors != config.sectors
        || fresh.variance != config.variance
    {
        info!("Planet, tile, sector and variance changes apply on the next run");
    }
    match engine.apply_config(&fresh) {
        Ok(()) => *config = fresh,
        Err(err) => tracing::warn!(%err, "Reloaded config rejected"),
    }
}
