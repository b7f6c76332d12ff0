//! Headless planet renderer.
//!
//! Loads `config.ron` (CLI flags override it), builds a planet with a single
//! color layer over in-memory GPU resources, runs the configured number of
//! frames and flies the camera once.
//!
//! `cargo run -p orbis-demo -- --frames 200 --fly-to 7.5,46,20000`

mod params;

use std::time::Instant;

use clap::Parser;
use orbis_camera::FlyParams;
use orbis_config::{CliArgs, Config, default_config_dir};
use orbis_math::{Ellipsoid, LonLat};
use orbis_planet::{MemoryHandler, Planet, PlanetEvent, SolidColorLayer};
use tracing::{info, warn};

/// Destination used when none is given on the command line.
const DEFAULT_FLIGHT: LonLat = LonLat::new(7.5, 46.0, 20_000.0);

fn main() {
    let args = CliArgs::parse();

    let config_dir = args
        .config
        .clone()
        .or_else(default_config_dir)
        .unwrap_or_else(|| ".orbis".into());

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    orbis_log::init_logging(Some(&config_dir.join("logs")), cfg!(debug_assertions), Some(&config));

    let ellipsoid = Ellipsoid::wgs84();
    let terrain = params::terrain_provider(&config, ellipsoid);
    let mut planet = Planet::new(
        ellipsoid,
        terrain,
        MemoryHandler::new(),
        params::planet_params(&config),
    );
    planet.add_layer(Box::new(SolidColorLayer::new(1, "ocean", [20, 60, 140, 255])));
    planet
        .camera_mut()
        .set_lon_lat(params::start_position(&config), None, None);

    planet.events_mut().on(PlanetEvent::Draw, |stats| {
        if stats.frame % 50 == 0 {
            info!(
                frame = stats.frame,
                rendered = stats.rendered_nodes,
                nodes = stats.tree_nodes,
                max_zoom = stats.max_rendered_zoom,
                normal_map_queue = stats.normal_map_queue,
                "Frame"
            );
        }
    });

    let destination = match args.fly_to.as_deref() {
        Some(&[lon, lat, height]) => LonLat::new(lon, lat, height),
        Some(other) => {
            warn!(values = other.len(), "Ignoring --fly-to, expected lon,lat,height");
            DEFAULT_FLIGHT
        }
        None => DEFAULT_FLIGHT,
    };

    let started = Instant::now();
    let mut normal_maps = 0;
    for frame in 0..config.debug.frames {
        if frame == 10 {
            info!(lon = destination.lon, lat = destination.lat, height = destination.height, "Flight started");
            planet.camera_mut().fly_lon_lat(
                destination,
                FlyParams::new().on_complete(|| info!("Flight finished")),
            );
        }
        let stats = planet.frame();
        normal_maps += stats.normal_maps_created;
        planet.handler_mut().take_draws();
    }

    let position = planet.camera().lon_lat();
    info!(
        frames = config.debug.frames,
        elapsed_ms = started.elapsed().as_millis() as u64,
        normal_maps,
        buffers = planet.handler().buffer_count(),
        textures = planet.handler().texture_count(),
        lon = position.lon,
        lat = position.lat,
        height = position.height,
        "Done"
    );
}
