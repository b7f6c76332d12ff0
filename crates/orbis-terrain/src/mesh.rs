//! Displaced tile meshes built off the render thread.

use glam::{DVec3, Vec3};
use orbis_math::{Bounds, TileKey};
use tracing::trace;

use crate::{PlainGrid, TerrainError, WorkerPool};

/// Input for one terrain mesh.
#[derive(Clone, Debug)]
pub struct TerrainJob {
    /// Heights for every node of `plain`, row-major from the north-west node.
    pub elevations: Vec<f32>,
    /// Undisplaced ellipsoid grid at normal-map resolution.
    pub plain: PlainGrid,
    /// Cells per side of the rendered grid. Must divide `plain.size`.
    pub grid_size: usize,
    pub height_factor: f64,
}

/// Output of [`build_terrain_mesh`].
#[derive(Clone, Debug, PartialEq)]
pub struct TerrainMesh {
    pub key: TileKey,
    /// Displaced vertices at normal-map resolution, flattened `xyz`.
    pub normal_map_vertices: Vec<f64>,
    /// Unit normals per normal-map vertex, flattened `xyz`.
    pub normal_map_normals: Vec<f32>,
    /// Displaced vertices of the rendered grid, flattened `xyz`.
    pub terrain_vertices: Vec<f64>,
    pub grid_size: usize,
    pub bounds: Bounds,
}

/// Accumulates per-cell cross products into vertex normals.
///
/// Each cell contributes one normal to the corners of each of its two triangles.
pub fn grid_normals(vertices: &[f64], size: usize) -> Vec<f32> {
    let row = size + 1;
    let v = |i: usize| DVec3::from_slice(&vertices[i * 3..i * 3 + 3]);
    let mut acc = vec![DVec3::ZERO; row * row];

    for i in 0..size {
        for j in 0..size {
            let i0 = i * row + j;
            let i1 = i0 + 1;
            let i2 = i0 + row;
            let i3 = i2 + 1;
            let (v0, v1, v2, v3) = (v(i0), v(i1), v(i2), v(i3));

            let n1 = (v2 - v0).cross(v1 - v0);
            acc[i0] += n1;
            acc[i1] += n1;
            acc[i2] += n1;

            let n2 = (v1 - v3).cross(v2 - v3);
            acc[i1] += n2;
            acc[i2] += n2;
            acc[i3] += n2;
        }
    }

    acc.iter()
        .flat_map(|n| {
            let n: Vec3 = n.normalize_or_zero().as_vec3();
            [n.x, n.y, n.z]
        })
        .collect()
}

/// Keeps every `step`-th node of a `(size + 1)²` grid in both directions.
pub fn subsample_grid(vertices: &[f64], size: usize, step: usize) -> Vec<f64> {
    let row = size + 1;
    let mut out = Vec::with_capacity((size / step + 1).pow(2) * 3);
    for i in (0..=size).step_by(step) {
        for j in (0..=size).step_by(step) {
            let k = (i * row + j) * 3;
            out.extend_from_slice(&vertices[k..k + 3]);
        }
    }
    out
}

/// Displaces the plain grid along its normals and derives normals and bounds.
pub fn build_terrain_mesh(key: TileKey, job: &TerrainJob) -> TerrainMesh {
    let size = job.plain.size;
    let mut vertices = Vec::with_capacity(job.plain.vertices.len());
    for (i, h) in job.elevations.iter().enumerate() {
        let p = job.plain.vertex(i) + job.plain.normal(i) * (*h as f64 * job.height_factor);
        vertices.extend_from_slice(&[p.x, p.y, p.z]);
    }

    let normal_map_normals = grid_normals(&vertices, size);
    let step = (size / job.grid_size.max(1)).max(1);
    let terrain_vertices = subsample_grid(&vertices, size, step);
    let bounds = Bounds::from_flat(&vertices);

    trace!(zoom = key.zoom, x = key.x, y = key.y, size, "Built terrain mesh");

    TerrainMesh {
        key,
        normal_map_vertices: vertices,
        normal_map_normals,
        terrain_vertices,
        grid_size: size / step,
        bounds,
    }
}

/// Background pool turning elevations into meshes.
pub struct TerrainWorker {
    pool: WorkerPool<TerrainJob, TerrainMesh>,
}

impl TerrainWorker {
    pub fn new(threads: usize, capacity: usize) -> Self {
        let threads = if threads == 0 {
            WorkerPool::<TerrainJob, TerrainMesh>::default_threads()
        } else {
            threads
        };
        Self {
            pool: WorkerPool::new("orbis-terrain-mesh", threads, capacity, |key, job| {
                build_terrain_mesh(key, &job)
            }),
        }
    }

    /// Queues a mesh build. Fails when the queue is full.
    pub fn submit(&self, key: TileKey, job: TerrainJob) -> Result<(), TerrainError> {
        self.pool.submit(key, job)
    }

    pub fn cancel(&self, key: &TileKey) {
        self.pool.cancel(key);
    }

    pub fn is_pending(&self, key: &TileKey) -> bool {
        self.pool.is_pending(key)
    }

    /// Finished meshes of jobs that were not cancelled.
    pub fn drain(&self) -> Vec<TerrainMesh> {
        self.pool.drain().into_iter().map(|(_, mesh)| mesh).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbis_math::Ellipsoid;

    fn job(key: TileKey, size: usize, height: f32) -> TerrainJob {
        let plain = PlainGrid::new(&Ellipsoid::wgs84(), key, size);
        TerrainJob {
            elevations: vec![height; (size + 1) * (size + 1)],
            plain,
            grid_size: size / 2,
            height_factor: 1.0,
        }
    }

    #[test]
    fn test_flat_elevation_lifts_every_vertex() {
        let key = TileKey::new(4, 5, 6);
        let e = Ellipsoid::wgs84();
        let mesh = build_terrain_mesh(key, &job(key, 8, 500.0));
        for i in 0..81 {
            let p = DVec3::from_slice(&mesh.normal_map_vertices[i * 3..i * 3 + 3]);
            assert!((e.cartesian_to_lon_lat(p).height - 500.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_normals_point_outward() {
        let key = TileKey::new(3, 2, 3);
        let mesh = build_terrain_mesh(key, &job(key, 8, 0.0));
        let plain = PlainGrid::new(&Ellipsoid::wgs84(), key, 8);
        for i in 0..81 {
            let n = Vec3::from_slice(&mesh.normal_map_normals[i * 3..i * 3 + 3]);
            assert!((n.length() - 1.0).abs() < 1e-5);
            assert!(n.dot(plain.normal(i).as_vec3()) > 0.99);
        }
    }

    #[test]
    fn test_render_grid_is_subsampled() {
        let key = TileKey::new(3, 2, 3);
        let mesh = build_terrain_mesh(key, &job(key, 8, 0.0));
        assert_eq!(mesh.grid_size, 4);
        assert_eq!(mesh.terrain_vertices.len(), 25 * 3);
        assert_eq!(&mesh.terrain_vertices[0..3], &mesh.normal_map_vertices[0..3]);
        let last = mesh.normal_map_vertices.len();
        let tlast = mesh.terrain_vertices.len();
        assert_eq!(
            &mesh.terrain_vertices[tlast - 3..],
            &mesh.normal_map_vertices[last - 3..]
        );
    }

    #[test]
    fn test_bounds_cover_vertices() {
        let key = TileKey::new(5, 3, 9);
        let mesh = build_terrain_mesh(key, &job(key, 4, 1200.0));
        for p in mesh.normal_map_vertices.chunks(3) {
            let p = DVec3::from_slice(p);
            assert!(p.cmpge(mesh.bounds.min).all() && p.cmple(mesh.bounds.max).all());
        }
    }

    #[test]
    fn test_worker_returns_mesh() {
        let worker = TerrainWorker::new(1, 8);
        let key = TileKey::new(2, 1, 1);
        worker.submit(key, job(key, 4, 10.0)).unwrap();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        let mut meshes = Vec::new();
        while meshes.is_empty() && std::time::Instant::now() < deadline {
            meshes = worker.drain();
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        assert_eq!(meshes.len(), 1);
        assert_eq!(meshes[0].key, key);
    }
}
