//! One quad-tree tile.
//!
//! A segment starts with plain geometry sampled on the ellipsoid, so it can be drawn
//! before any elevation arrives. Elevations either replace that geometry through a
//! [`TerrainMesh`] or confirm the plain shape when the provider has nothing.

use glam::DVec3;
use orbis_camera::{Camera, Frustum, TerrainHit};
use orbis_core::Lock;
use orbis_math::{
    BoundingBox, BoundingSphere, Bounds, Ellipsoid, Extent, LonLat, Ray, RayHit, TileKey,
};
use orbis_terrain::{
    PlainGrid, TerrainError, TerrainJob, TerrainMesh, TerrainProvider, subsample_grid,
};
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::handler::{BufferHandle, GpuHandler, HandlerError, TextureDesc, TextureFormat, TextureHandle};
use crate::layer::{Layer, Material};

/// Zoom from which terrain-ready tiles are culled by box instead of sphere.
pub const BOX_CULLING_ZOOM: u8 = 6;

/// What [`Segment::load_terrain`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerrainLoad {
    /// An elevation request is now in flight.
    Requested,
    /// Nothing to do this frame: already loading or ready, or requests are paused.
    Waiting,
    /// The tile keeps its plain geometry and is terrain-ready.
    Plain,
    /// The tile is finer than the provider; build terrain from an ancestor.
    Extrapolate,
}

/// One terrain tile: plain and displaced geometry, elevations, bounds, normal-map
/// normals, layer materials and the GPU resources built from them.
pub struct Segment {
    key: TileKey,
    extent: Extent,
    extent_lon_lat: Extent,

    plain: PlainGrid,
    plain_radius: f64,
    grid_size: usize,
    terrain_vertices: Vec<f64>,
    pub(crate) normal_map_normals: Vec<f32>,
    elevations: Option<Vec<f32>>,

    bounds: Bounds,
    bsphere: BoundingSphere,
    bbox: BoundingBox,

    terrain_is_loading: bool,
    terrain_ready: bool,
    terrain_exists: bool,
    normal_map_ready: bool,
    pub(crate) in_the_queue: bool,
    /// Zoom of the neighbor each side was last equalized with.
    pub(crate) applied_neighbors_zoom: [u8; 4],

    geometry_dirty: bool,
    vertex_buffers: Option<(BufferHandle, BufferHandle)>,
    normal_map_texture: Option<TextureHandle>,
    materials: FxHashMap<u32, Material>,
    destroyed: bool,
}

impl Segment {
    /// Creates a tile with plain geometry: a `file_grid_size` normal-map grid on the
    /// ellipsoid, drawn at `grid_size` cells per side.
    pub fn new(ellipsoid: &Ellipsoid, key: TileKey, file_grid_size: usize, grid_size: usize) -> Self {
        let plain = PlainGrid::new(ellipsoid, key, file_grid_size);
        let step = file_grid_size / grid_size.clamp(1, file_grid_size);
        let grid_size = file_grid_size / step;
        let terrain_vertices = subsample_grid(&plain.vertices, file_grid_size, step);
        let bounds = Bounds::from_flat(&plain.vertices);
        let bsphere = BoundingSphere::from_bounds(&bounds);
        let extent = Extent::from_tile(key);

        Self {
            key,
            extent,
            extent_lon_lat: extent.inverse_mercator(),
            normal_map_normals: plain.normals.iter().map(|&n| n as f32).collect(),
            plain_radius: bsphere.radius,
            plain,
            grid_size,
            terrain_vertices,
            elevations: None,
            bounds,
            bsphere,
            bbox: BoundingBox::from_bounds(&bounds),
            terrain_is_loading: false,
            terrain_ready: false,
            terrain_exists: false,
            normal_map_ready: false,
            in_the_queue: false,
            applied_neighbors_zoom: [0; 4],
            geometry_dirty: true,
            vertex_buffers: None,
            normal_map_texture: None,
            materials: FxHashMap::default(),
            destroyed: false,
        }
    }

    pub fn key(&self) -> TileKey {
        self.key
    }

    /// Web-Mercator extent.
    pub fn extent(&self) -> &Extent {
        &self.extent
    }

    pub fn extent_lon_lat(&self) -> &Extent {
        &self.extent_lon_lat
    }

    pub fn bsphere(&self) -> &BoundingSphere {
        &self.bsphere
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn plain_radius(&self) -> f64 {
        self.plain_radius
    }

    /// Cells per side of the rendered grid.
    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    /// Cells per side of the elevation and normal-map grid.
    pub fn file_grid_size(&self) -> usize {
        self.plain.size
    }

    pub fn terrain_vertices(&self) -> &[f64] {
        &self.terrain_vertices
    }

    pub fn normal_map_normals(&self) -> &[f32] {
        &self.normal_map_normals
    }

    pub fn elevations(&self) -> Option<&[f32]> {
        self.elevations.as_deref()
    }

    /// Buffers are uploaded and the tile can be drawn.
    pub fn is_ready(&self) -> bool {
        self.vertex_buffers.is_some()
    }

    pub fn terrain_ready(&self) -> bool {
        self.terrain_ready
    }

    pub fn terrain_exists(&self) -> bool {
        self.terrain_exists
    }

    pub fn is_terrain_loading(&self) -> bool {
        self.terrain_is_loading
    }

    pub fn normal_map_ready(&self) -> bool {
        self.normal_map_ready
    }

    pub fn normal_map_texture(&self) -> Option<TextureHandle> {
        self.normal_map_texture
    }

    pub fn vertex_buffers(&self) -> Option<(BufferHandle, BufferHandle)> {
        self.vertex_buffers
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// True when the tile is small enough on screen that it need not split.
    pub fn accept_for_rendering(&self, camera: &Camera, lod_size: f64) -> bool {
        camera.projected_size(self.bsphere.center, self.bsphere.radius) < lod_size
    }

    /// Box test for fine tiles with terrain, sphere test otherwise.
    pub fn in_frustum(&self, frustum: &Frustum) -> bool {
        if self.terrain_ready && self.key.zoom >= BOX_CULLING_ZOOM {
            frustum.contains_box(&self.bbox)
        } else {
            frustum.contains_sphere(self.bsphere.center, self.bsphere.radius)
        }
    }

    /// Advances terrain loading by one step.
    ///
    /// Tiles below the provider range get plain terrain, tiles past it ask for
    /// extrapolation, and the rest request elevations once while `terrain_lock` is free.
    pub fn load_terrain(&mut self, provider: &dyn TerrainProvider, terrain_lock: &Lock) -> TerrainLoad {
        if self.destroyed {
            return TerrainLoad::Waiting;
        }
        if self.key.zoom < provider.min_zoom() || provider.is_empty() {
            if self.terrain_ready {
                return TerrainLoad::Waiting;
            }
            self.elevations_not_exists();
            return TerrainLoad::Plain;
        }
        if self.key.zoom > provider.max_zoom() {
            return if self.terrain_ready {
                TerrainLoad::Waiting
            } else {
                TerrainLoad::Extrapolate
            };
        }
        if self.terrain_is_loading || self.terrain_ready || terrain_lock.is_locked() {
            return TerrainLoad::Waiting;
        }
        match provider.request(self.key) {
            Ok(()) => {
                self.terrain_is_loading = true;
                TerrainLoad::Requested
            }
            Err(TerrainError::QueueFull(in_flight)) => {
                trace!(zoom = self.key.zoom, x = self.key.x, y = self.key.y, in_flight, "Elevation queue full");
                TerrainLoad::Waiting
            }
            Err(e) => {
                warn!(error = %e, "Elevation provider unavailable, keeping plain terrain");
                self.elevations_not_exists();
                TerrainLoad::Plain
            }
        }
    }

    /// Accepts an elevation grid and returns the mesh job to run off-thread.
    ///
    /// Returns `None` for a tile that is no longer waiting for terrain.
    pub fn elevations_exists(
        &mut self,
        elevations: Vec<f32>,
        grid_size: usize,
        height_factor: f64,
    ) -> Option<TerrainJob> {
        if self.destroyed || !self.terrain_is_loading {
            return None;
        }
        let nodes = (self.plain.size + 1) * (self.plain.size + 1);
        if elevations.len() != nodes {
            warn!(
                zoom = self.key.zoom,
                x = self.key.x,
                y = self.key.y,
                got = elevations.len(),
                expected = nodes,
                "Elevation grid size mismatch, keeping plain terrain"
            );
            self.elevations_not_exists();
            return None;
        }
        self.elevations = Some(elevations.clone());
        Some(TerrainJob {
            elevations,
            plain: self.plain.clone(),
            grid_size,
            height_factor,
        })
    }

    /// Keeps the plain ellipsoid geometry as the tile's terrain.
    pub fn elevations_not_exists(&mut self) {
        if self.destroyed {
            return;
        }
        let size = self.plain.size;
        self.terrain_vertices = subsample_grid(&self.plain.vertices, size, size / self.grid_size);
        self.normal_map_normals = self.plain.normals.iter().map(|&n| n as f32).collect();
        self.set_bounds(Bounds::from_flat(&self.terrain_vertices));
        self.elevations = None;
        self.terrain_is_loading = false;
        self.terrain_ready = true;
        self.terrain_exists = false;
        self.normal_map_ready = false;
        self.applied_neighbors_zoom = [0; 4];
        self.geometry_dirty = true;
    }

    /// Swaps in a finished terrain mesh.
    pub fn apply_terrain_mesh(&mut self, mesh: TerrainMesh) {
        if self.destroyed {
            return;
        }
        self.terrain_vertices = mesh.terrain_vertices;
        self.normal_map_normals = mesh.normal_map_normals;
        self.grid_size = mesh.grid_size;
        self.set_bounds(mesh.bounds);
        self.terrain_is_loading = false;
        self.terrain_ready = true;
        self.terrain_exists = true;
        self.normal_map_ready = false;
        self.applied_neighbors_zoom = [0; 4];
        self.geometry_dirty = true;
    }

    /// Builds a job from an ancestor's elevations for a tile finer than the provider.
    pub fn extrapolate(
        &mut self,
        ancestor: TileKey,
        ancestor_elevations: &[f32],
        height_factor: f64,
    ) -> TerrainJob {
        let elevations = extrapolate_elevations(ancestor, ancestor_elevations, self.key, self.plain.size);
        self.elevations = Some(elevations.clone());
        self.terrain_is_loading = true;
        TerrainJob {
            elevations,
            plain: self.plain.clone(),
            grid_size: self.grid_size,
            height_factor,
        }
    }

    fn set_bounds(&mut self, bounds: Bounds) {
        self.bounds = bounds;
        self.bsphere = BoundingSphere::from_bounds(&bounds);
        self.bbox = BoundingBox::from_bounds(&bounds);
    }

    /// Terrain under `eye`, found by casting along the surface normal into the grid
    /// cell that contains `merc`.
    pub fn terrain_point(&self, ellipsoid: &Ellipsoid, eye: DVec3, merc: &LonLat) -> Option<TerrainHit> {
        if self.destroyed || !self.extent.is_inside(merc) {
            return None;
        }
        let size = self.grid_size;
        let row = size + 1;
        let qx = self.extent.width() / size as f64;
        let qy = self.extent.height() / size as f64;
        let ix = (((merc.lon - self.extent.west()) / qx).floor() as usize).min(size - 1);
        let iy = (((self.extent.north() - merc.lat) / qy).floor() as usize).min(size - 1);

        let v = |i: usize| DVec3::from_slice(&self.terrain_vertices[i * 3..i * 3 + 3]);
        let i0 = iy * row + ix;
        let i2 = i0 + row;
        let (v0, v1, v2, v3) = (v(i0), v(i0 + 1), v(i2), v(i2 + 1));

        let ray = Ray::new(eye, -ellipsoid.surface_normal(eye));
        for (a, b, c) in [(v0, v1, v2), (v1, v3, v2)] {
            match ray.hit_triangle(a, b, c) {
                RayHit::Inside(point) => {
                    return Some(TerrainHit {
                        point,
                        altitude: eye.distance(point),
                    });
                }
                RayHit::Away(point) => {
                    return Some(TerrainHit {
                        point,
                        altitude: -eye.distance(point),
                    });
                }
                RayHit::Outside | RayHit::InPlane => {}
            }
        }
        None
    }

    /// Uploads changed geometry as split high/low float buffers.
    pub fn upload(&mut self, handler: &mut dyn GpuHandler) -> Result<(), HandlerError> {
        if self.destroyed || !self.geometry_dirty {
            return Ok(());
        }
        let (high, low) = split_high_low(&self.terrain_vertices);
        let label = format!("segment:{}", self.key);
        let high = handler.create_buffer(&label, bytemuck::cast_slice(&high))?;
        let low = match handler.create_buffer(&label, bytemuck::cast_slice(&low)) {
            Ok(low) => low,
            Err(e) => {
                if let Err(release) = handler.delete_buffer(high) {
                    warn!(segment = %self.key, error = %release, "Failed to release high vertex buffer");
                }
                return Err(e);
            }
        };
        self.release_buffers(handler);
        self.vertex_buffers = Some((high, low));
        self.geometry_dirty = false;
        Ok(())
    }

    /// Uploads the current normals as the tile's normal-map texture.
    pub fn create_normal_map_texture(&mut self, handler: &mut dyn GpuHandler) -> Result<(), HandlerError> {
        if self.destroyed {
            return Ok(());
        }
        let side = self.plain.size as u32 + 1;
        let desc = TextureDesc::new(side, side, TextureFormat::Rgb32Float);
        let label = format!("normal-map:{}", self.key);
        let texture = handler.create_texture(&label, desc, bytemuck::cast_slice(&self.normal_map_normals))?;
        if let Some(old) = self.normal_map_texture.replace(texture)
            && let Err(e) = handler.delete_texture(old)
        {
            warn!(error = %e, "Failed to release old normal map");
        }
        self.normal_map_ready = true;
        Ok(())
    }

    pub fn material(&self, layer_id: u32) -> Option<&Material> {
        self.materials.get(&layer_id)
    }

    /// Drops one layer's material and its texture.
    pub fn release_material(&mut self, layer_id: u32, handler: &mut dyn GpuHandler) {
        if let Some(mut material) = self.materials.remove(&layer_id) {
            material.release(handler);
        }
    }

    /// Loads textures for every layer drawn on this tile that has none yet.
    pub fn load_materials(&mut self, layers: &[Box<dyn Layer>], handler: &mut dyn GpuHandler) {
        if self.destroyed {
            return;
        }
        for layer in layers {
            if !layer.applies_to(&self.key, &self.extent) {
                continue;
            }
            let material = self
                .materials
                .entry(layer.id())
                .or_insert_with(|| Material::new(layer.id()));
            if let Err(e) = material.load(layer.as_ref(), self.key, &self.extent, handler) {
                debug!(layer = layer.id(), zoom = self.key.zoom, error = %e, "Layer texture failed, retrying later");
            }
        }
    }

    /// Releases every GPU resource and the terrain buffers. Safe to call repeatedly.
    pub fn destroy(&mut self, handler: &mut dyn GpuHandler) {
        if self.destroyed {
            return;
        }
        self.release_buffers(handler);
        if let Some(texture) = self.normal_map_texture.take()
            && let Err(e) = handler.delete_texture(texture)
        {
            warn!(error = %e, "Failed to release normal map");
        }
        for material in self.materials.values_mut() {
            material.release(handler);
        }
        self.materials.clear();
        self.terrain_vertices = Vec::new();
        self.normal_map_normals = Vec::new();
        self.elevations = None;
        self.terrain_is_loading = false;
        self.terrain_ready = false;
        self.normal_map_ready = false;
        self.destroyed = true;
        trace!(zoom = self.key.zoom, x = self.key.x, y = self.key.y, "Segment destroyed");
    }

    fn release_buffers(&mut self, handler: &mut dyn GpuHandler) {
        if let Some((high, low)) = self.vertex_buffers.take() {
            for buffer in [high, low] {
                if let Err(e) = handler.delete_buffer(buffer) {
                    warn!(error = %e, "Failed to release vertex buffer");
                }
            }
        }
    }
}

/// Splits doubles into a float and its rounding remainder.
pub fn split_high_low(values: &[f64]) -> (Vec<f32>, Vec<f32>) {
    values
        .iter()
        .map(|&v| {
            let high = v as f32;
            (high, (v - high as f64) as f32)
        })
        .unzip()
}

/// Bilinear resampling of an ancestor's elevation grid over a descendant tile.
pub fn extrapolate_elevations(ancestor: TileKey, elevations: &[f32], key: TileKey, size: usize) -> Vec<f32> {
    let scale = 1u32 << (key.zoom - ancestor.zoom);
    let row = size + 1;
    let ox = (key.x - ancestor.x * scale) as f64;
    let oy = (key.y - ancestor.y * scale) as f64;
    let step = size as f64 / scale as f64;
    let at = |i: usize, j: usize| elevations[i.min(size) * row + j.min(size)] as f64;

    let mut out = Vec::with_capacity(row * row);
    for i in 0..=size {
        for j in 0..=size {
            let u = (ox + j as f64 / size as f64) * step;
            let v = (oy + i as f64 / size as f64) * step;
            let (j0, i0) = (u.floor() as usize, v.floor() as usize);
            let (fu, fv) = (u - j0 as f64, v - i0 as f64);
            let top = at(i0, j0) * (1.0 - fu) + at(i0, j0 + 1) * fu;
            let bottom = at(i0 + 1, j0) * (1.0 - fu) + at(i0 + 1, j0 + 1) * fu;
            out.push((top * (1.0 - fv) + bottom * fv) as f32);
        }
    }
    out
}
