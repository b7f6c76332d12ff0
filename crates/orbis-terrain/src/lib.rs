//! Elevation sources and off-thread terrain mesh construction.
//!
//! A [`TerrainProvider`] answers every elevation request for a tile with exactly one
//! [`ElevationResponse`], either an elevation grid or an explicit absence. The
//! [`TerrainWorker`] turns elevation grids into displaced vertices and normals on a
//! background pool so the render thread only swaps finished buffers in.

mod error;
mod grid;
mod heightmap;
mod mesh;
mod pool;
mod procedural;
mod provider;

pub use error::TerrainError;
pub use grid::{PlainGrid, grid_lon_lat, grid_mercator};
pub use heightmap::{HeightmapParams, HeightmapSampler};
pub use mesh::{TerrainJob, TerrainMesh, TerrainWorker, build_terrain_mesh, grid_normals, subsample_grid};
pub use pool::WorkerPool;
pub use procedural::{ProceduralTerrain, ProceduralTerrainParams, generate_elevations};
pub use provider::{ElevationResponse, EmptyTerrain, TerrainProvider};
