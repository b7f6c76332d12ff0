//! Noise-based elevation provider.

use orbis_math::{Ellipsoid, TileKey};
use tracing::debug;

use crate::grid::grid_lon_lat;
use crate::{ElevationResponse, HeightmapParams, HeightmapSampler, TerrainError, TerrainProvider, WorkerPool};

#[derive(Clone, Debug, PartialEq)]
pub struct ProceduralTerrainParams {
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub file_grid_size: usize,
    pub heightmap: HeightmapParams,
    /// Heights below this are clamped to it.
    pub sea_level: f64,
    /// 0 picks one thread per spare core.
    pub worker_threads: usize,
    pub queue_capacity: usize,
}

impl Default for ProceduralTerrainParams {
    fn default() -> Self {
        Self {
            min_zoom: 2,
            max_zoom: 14,
            file_grid_size: 32,
            heightmap: HeightmapParams::default(),
            sea_level: 0.0,
            worker_threads: 0,
            queue_capacity: 256,
        }
    }
}

/// Samples the heightmap at every node of the tile's elevation grid.
///
/// Tiles lying entirely at or below sea level answer `NotExists`.
pub fn generate_elevations(
    sampler: &HeightmapSampler,
    ellipsoid: &Ellipsoid,
    key: TileKey,
    file_grid_size: usize,
    sea_level: f64,
) -> ElevationResponse {
    let mut any_land = false;
    let elevations: Vec<f32> = grid_lon_lat(key, file_grid_size)
        .map(|ll| {
            let h = sampler.sample(ellipsoid.lon_lat_to_cartesian(&ll));
            if h > sea_level {
                any_land = true;
                h as f32
            } else {
                sea_level as f32
            }
        })
        .collect();

    if any_land {
        ElevationResponse::Exists { key, elevations }
    } else {
        ElevationResponse::NotExists { key }
    }
}

pub struct ProceduralTerrain {
    params: ProceduralTerrainParams,
    pool: WorkerPool<(), ElevationResponse>,
}

impl ProceduralTerrain {
    pub fn new(ellipsoid: Ellipsoid, params: ProceduralTerrainParams) -> Self {
        let threads = if params.worker_threads == 0 {
            WorkerPool::<(), ElevationResponse>::default_threads()
        } else {
            params.worker_threads
        };
        let sampler = HeightmapSampler::new(params.heightmap.clone());
        let file_grid_size = params.file_grid_size;
        let sea_level = params.sea_level;

        debug!(
            threads,
            seed = params.heightmap.seed,
            min_zoom = params.min_zoom,
            max_zoom = params.max_zoom,
            "Starting procedural terrain"
        );

        let pool = WorkerPool::new(
            "orbis-elevation",
            threads,
            params.queue_capacity,
            move |key, ()| generate_elevations(&sampler, &ellipsoid, key, file_grid_size, sea_level),
        );
        Self { params, pool }
    }

    pub fn params(&self) -> &ProceduralTerrainParams {
        &self.params
    }

    pub fn in_flight_count(&self) -> u64 {
        self.pool.in_flight_count()
    }
}

impl TerrainProvider for ProceduralTerrain {
    fn min_zoom(&self) -> u8 {
        self.params.min_zoom
    }

    fn max_zoom(&self) -> u8 {
        self.params.max_zoom
    }

    fn file_grid_size(&self) -> usize {
        self.params.file_grid_size
    }

    fn request(&self, key: TileKey) -> Result<(), TerrainError> {
        self.pool.submit(key, ())
    }

    fn cancel(&self, key: &TileKey) {
        self.pool.cancel(key);
    }

    fn is_pending(&self, key: &TileKey) -> bool {
        self.pool.is_pending(key)
    }

    fn drain(&self) -> Vec<ElevationResponse> {
        self.pool.drain().into_iter().map(|(_, r)| r).collect()
    }
}
