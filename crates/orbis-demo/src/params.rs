//! Maps loaded settings onto the runtime parameter structs.

use orbis_camera::{CameraParams, PlanetCameraParams};
use orbis_config::{Config, TerrainKind};
use orbis_math::{Ellipsoid, LonLat};
use orbis_planet::{LodParams, NormalMapParams, PlanetParams};
use orbis_terrain::{
    EmptyTerrain, HeightmapParams, ProceduralTerrain, ProceduralTerrainParams, TerrainProvider,
};

pub fn planet_params(config: &Config) -> PlanetParams {
    let defaults = LodParams::default();
    PlanetParams {
        camera: PlanetCameraParams {
            camera: CameraParams {
                view_angle: config.camera.view_angle,
                near: config.camera.near,
                far: config.camera.far,
                width: f64::from(config.viewport.width),
                height: f64::from(config.viewport.height),
            },
            min_altitude: config.camera.min_altitude,
            max_altitude: config.camera.max_altitude,
            fly_frames: config.camera.fly_frames,
            ..Default::default()
        },
        lod: LodParams {
            lod_size: defaults.lod_size * config.lod.lod_ratio,
            min_lod_size: defaults.min_lod_size * config.lod.lod_ratio,
            max_zoom: config.lod.max_zoom,
            max_rendered_nodes: config.lod.max_rendered_nodes,
        },
        normal_map: NormalMapParams {
            frame_budget_ms: config.normal_map.frame_budget_ms,
            max_per_frame: config.normal_map.max_per_frame,
        },
        height_factor: config.terrain.height_factor,
        worker_threads: config.terrain.worker_threads,
        ..Default::default()
    }
}

pub fn terrain_provider(config: &Config, ellipsoid: Ellipsoid) -> Box<dyn TerrainProvider> {
    match config.terrain.kind {
        TerrainKind::Empty => Box::new(EmptyTerrain::new()),
        TerrainKind::Procedural => Box::new(ProceduralTerrain::new(
            ellipsoid,
            ProceduralTerrainParams {
                min_zoom: config.terrain.min_zoom,
                max_zoom: config.terrain.max_zoom,
                file_grid_size: config.terrain.file_grid_size,
                heightmap: HeightmapParams {
                    seed: config.terrain.seed,
                    ..Default::default()
                },
                worker_threads: config.terrain.worker_threads,
                ..Default::default()
            },
        )),
    }
}

pub fn start_position(config: &Config) -> LonLat {
    LonLat::new(
        config.camera.start_lon,
        config.camera.start_lat,
        config.camera.start_height,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lod_ratio_scales_thresholds() {
        let mut config = Config::default();
        config.lod.lod_ratio = 0.5;
        let params = planet_params(&config);
        assert_eq!(params.lod.lod_size, 125.0);
        assert_eq!(params.lod.min_lod_size, 156.0);
    }

    #[test]
    fn test_viewport_reaches_camera() {
        let mut config = Config::default();
        config.viewport.width = 640;
        config.camera.min_altitude = 20.0;
        let params = planet_params(&config);
        assert_eq!(params.camera.camera.width, 640.0);
        assert_eq!(params.camera.min_altitude, 20.0);
    }

    #[test]
    fn test_flat_terrain_is_empty() {
        let mut config = Config::default();
        config.terrain.kind = TerrainKind::Empty;
        assert!(terrain_provider(&config, Ellipsoid::wgs84()).is_empty());
    }
}
