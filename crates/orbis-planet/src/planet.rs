//! The per-frame driver.
//!
//! [`Planet::frame`] runs one render tick on the calling thread: advance any
//! flight, refresh the camera, fold in finished background work, walk the tile
//! tree, make normal maps, draw, and keep the camera above the terrain.

use glam::DVec3;
use orbis_camera::{CameraView, PlanetCamera, PlanetCameraParams, TerrainHit, TerrainSurface};
use orbis_core::{EventChannel, PickingColor, PickingRegistry, PlanetLocks};
use orbis_math::{Ellipsoid, LonLat, TileKey};
use orbis_terrain::{ElevationResponse, TerrainJob, TerrainProvider, TerrainWorker, build_terrain_mesh};
use rustc_hash::FxHashMap;
use tracing::{debug, info, trace, warn};

use crate::handler::{DrawCall, GpuHandler, LayerSlot};
use crate::layer::Layer;
use crate::normal_map::{NormalMapCreator, NormalMapParams};
use crate::quadtree::QuadTree;
use crate::segment::{Segment, TerrainLoad};

/// Surface distance visible per square-rooted meter of eye height.
const VISIBLE_DISTANCE: f64 = 3570.0;
/// Above this height tiles are tested against the planet horizon.
const HORIZON_TEST_HEIGHT: f64 = 21_000.0;

/// Level-of-detail thresholds for the tree walk.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LodParams {
    /// On-screen size in pixels below which a tile stops splitting when viewed
    /// straight down.
    pub lod_size: f64,
    /// The same threshold for a grazing view.
    pub min_lod_size: f64,
    /// Deepest zoom the tree may reach.
    pub max_zoom: u8,
    pub max_rendered_nodes: usize,
}

impl Default for LodParams {
    fn default() -> Self {
        Self {
            lod_size: 250.0,
            min_lod_size: 312.0,
            max_zoom: 22,
            max_rendered_nodes: 1000,
        }
    }
}

impl LodParams {
    /// Threshold for the current camera slope.
    pub fn lod_size_for_slope(&self, slope: f64) -> f64 {
        self.min_lod_size + slope.max(0.0) * (self.lod_size - self.min_lod_size)
    }
}

/// Everything [`Planet::new`] needs besides the ellipsoid, terrain and handler.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlanetParams {
    pub camera: PlanetCameraParams,
    pub lod: LodParams,
    pub normal_map: NormalMapParams,
    /// Multiplier applied to every elevation.
    pub height_factor: f64,
    /// Mesh worker threads, 0 picks one per spare core.
    pub worker_threads: usize,
    pub worker_capacity: usize,
}

impl Default for PlanetParams {
    fn default() -> Self {
        Self {
            camera: PlanetCameraParams::default(),
            lod: LodParams::default(),
            normal_map: NormalMapParams::default(),
            height_factor: 1.0,
            worker_threads: 0,
            worker_capacity: 256,
        }
    }
}

/// Events dispatched by [`Planet`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlanetEvent {
    /// Emitted once at the end of every frame.
    Draw,
}

/// Summary of one [`Planet::frame`] call, also the payload of [`PlanetEvent::Draw`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameStats {
    pub frame: u64,
    pub rendered_nodes: usize,
    pub tree_nodes: usize,
    pub max_rendered_zoom: u8,
    pub normal_maps_created: usize,
    pub normal_map_queue: usize,
    pub terrain_collision: bool,
}

/// Terrain renderer core for one planet.
///
/// Owns the tile tree, the camera, the layers and the workers. Each call to
/// [`Planet::frame`] advances the camera, applies finished terrain, walks the tree to
/// pick the tiles to draw, updates normal maps and submits draw calls to `H`.
pub struct Planet<H: GpuHandler> {
    ellipsoid: Ellipsoid,
    camera: PlanetCamera,
    locks: PlanetLocks,
    params: PlanetParams,

    terrain: Box<dyn TerrainProvider>,
    worker: TerrainWorker,
    normal_map_creator: NormalMapCreator,
    handler: H,

    layers: Vec<Box<dyn Layer>>,
    layer_colors: FxHashMap<u32, PickingColor>,
    picking: PickingRegistry<u32>,

    tree: QuadTree,
    rendered: Vec<TileKey>,
    frame_index: u64,
    events: EventChannel<PlanetEvent, FrameStats>,
}

impl<H: GpuHandler> Planet<H> {
    /// Builds a planet holding only the root tile.
    pub fn new(
        ellipsoid: Ellipsoid,
        terrain: Box<dyn TerrainProvider>,
        handler: H,
        params: PlanetParams,
    ) -> Self {
        let locks = PlanetLocks::new();
        let camera = PlanetCamera::new(ellipsoid, locks.clone(), params.camera);
        let normal_map_creator = NormalMapCreator::new(locks.normal_map.clone(), params.normal_map);
        let worker = TerrainWorker::new(params.worker_threads, params.worker_capacity);

        let mut tree = QuadTree::new();
        tree.insert(Segment::new(
            &ellipsoid,
            TileKey::ROOT,
            terrain.file_grid_size(),
            terrain.grid_size(0),
        ));

        info!(
            min_zoom = terrain.min_zoom(),
            max_zoom = terrain.max_zoom(),
            file_grid_size = terrain.file_grid_size(),
            "Planet created"
        );

        Self {
            ellipsoid,
            camera,
            locks,
            params,
            terrain,
            worker,
            normal_map_creator,
            handler,
            layers: Vec::new(),
            layer_colors: FxHashMap::default(),
            picking: PickingRegistry::new(),
            tree,
            rendered: Vec::new(),
            frame_index: 0,
            events: EventChannel::new(),
        }
    }

    pub fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }

    pub fn camera(&self) -> &PlanetCamera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut PlanetCamera {
        &mut self.camera
    }

    pub fn locks(&self) -> &PlanetLocks {
        &self.locks
    }

    pub fn params(&self) -> &PlanetParams {
        &self.params
    }

    pub fn terrain(&self) -> &dyn TerrainProvider {
        self.terrain.as_ref()
    }

    pub fn tree(&self) -> &QuadTree {
        &self.tree
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Direct access to the backend, e.g. to read back a picking pass.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn normal_map_creator(&self) -> &NormalMapCreator {
        &self.normal_map_creator
    }

    /// Tiles drawn in the last frame.
    pub fn rendered(&self) -> &[TileKey] {
        &self.rendered
    }

    pub fn events(&self) -> &EventChannel<PlanetEvent, FrameStats> {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventChannel<PlanetEvent, FrameStats> {
        &mut self.events
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    /// Adds a layer on top of the others. A layer with an existing id replaces it.
    pub fn add_layer(&mut self, layer: Box<dyn Layer>) {
        let id = layer.id();
        self.remove_layer(id);
        if layer.is_pickable() {
            let color = self.picking.assign(id);
            self.layer_colors.insert(id, color);
        }
        debug!(id, name = layer.name(), "Layer added");
        self.layers.push(layer);
    }

    /// Removes a layer and releases its textures on every tile.
    pub fn remove_layer(&mut self, id: u32) -> Option<Box<dyn Layer>> {
        let index = self.layers.iter().position(|l| l.id() == id)?;
        let layer = self.layers.remove(index);
        if let Some(color) = self.layer_colors.remove(&id) {
            self.picking.release(color);
        }
        let keys: Vec<TileKey> = self.tree.keys().copied().collect();
        for key in keys {
            if let Some(segment) = self.tree.segment_mut(&key) {
                segment.release_material(id, &mut self.handler);
            }
        }
        Some(layer)
    }

    pub fn layer_color(&self, id: u32) -> Option<PickingColor> {
        self.layer_colors.get(&id).copied()
    }

    /// Layer under a picking color read back from the picking pass.
    pub fn pick(&self, color: PickingColor) -> Option<&dyn Layer> {
        let id = *self.picking.get(color)?;
        self.layers.iter().find(|l| l.id() == id).map(|l| l.as_ref())
    }

    /// Runs one frame.
    pub fn frame(&mut self) -> FrameStats {
        self.frame_index += 1;

        // A flight step already refreshes the view.
        if self.camera.is_flying() {
            self.camera.check_fly();
        } else {
            self.camera.update();
        }

        self.apply_elevations();
        self.apply_meshes();

        let lod_size = self.params.lod.lod_size_for_slope(self.camera.slope());
        let rendered = {
            let mut walk = Walk {
                tree: &mut self.tree,
                camera: &self.camera,
                ellipsoid: &self.ellipsoid,
                terrain: self.terrain.as_ref(),
                worker: &self.worker,
                nmc: &mut self.normal_map_creator,
                handler: &mut self.handler,
                locks: &self.locks,
                lod_size,
                max_zoom: self.params.lod.max_zoom,
                max_nodes: self.params.lod.max_rendered_nodes,
                height_factor: self.params.height_factor,
                frame: self.frame_index,
                rendered: Vec::new(),
            };
            walk.node(TileKey::ROOT);
            walk.rendered
        };
        self.rendered = rendered;

        let normal_maps_created =
            self.normal_map_creator
                .frame(&mut self.tree, &mut self.handler, self.terrain.min_zoom());

        self.render();

        let surface = TreeSurface {
            tree: &self.tree,
            ellipsoid: &self.ellipsoid,
        };
        let terrain_collision = self.camera.check_terrain_collision(&surface);
        self.camera.camera_mut().check_move_end();

        let stats = FrameStats {
            frame: self.frame_index,
            rendered_nodes: self.rendered.len(),
            tree_nodes: self.tree.len(),
            max_rendered_zoom: self.rendered.iter().map(|k| k.zoom).max().unwrap_or(0),
            normal_maps_created,
            normal_map_queue: self.normal_map_creator.queue_size(),
            terrain_collision,
        };
        trace!(?stats, "Frame done");
        self.events.dispatch(PlanetEvent::Draw, &stats);
        stats
    }

    /// Hands provider responses to their tiles.
    fn apply_elevations(&mut self) {
        for response in self.terrain.drain() {
            let key = response.key();
            let Some(segment) = self.tree.segment_mut(&key) else {
                continue;
            };
            match response {
                ElevationResponse::Exists { elevations, .. } => {
                    let grid_size = self.terrain.grid_size(key.zoom);
                    if let Some(job) =
                        segment.elevations_exists(elevations, grid_size, self.params.height_factor)
                    {
                        submit_mesh(&self.worker, segment, &mut self.normal_map_creator, key, job);
                    }
                }
                ElevationResponse::NotExists { .. } => {
                    if segment.is_terrain_loading() {
                        segment.elevations_not_exists();
                        if !segment.in_the_queue {
                            self.normal_map_creator.queue(segment);
                        }
                    }
                }
            }
        }
    }

    /// Swaps finished meshes into their tiles.
    fn apply_meshes(&mut self) {
        for mesh in self.worker.drain() {
            let key = mesh.key;
            if let Some(segment) = self.tree.segment_mut(&key)
                && segment.is_terrain_loading()
            {
                segment.apply_terrain_mesh(mesh);
                if !segment.in_the_queue {
                    self.normal_map_creator.queue(segment);
                }
            }
        }
    }

    /// Uploads geometry and materials of drawn tiles and issues one draw per tile.
    fn render(&mut self) {
        let layers_free = self.locks.layers.is_free();
        for key in &self.rendered {
            let Some(segment) = self.tree.segment_mut(key) else {
                continue;
            };
            if let Err(e) = segment.upload(&mut self.handler) {
                warn!(zoom = key.zoom, x = key.x, y = key.y, error = %e, "Tile upload failed");
                continue;
            }
            if layers_free {
                segment.load_materials(&self.layers, &mut self.handler);
            }
            if let Some(call) = draw_call(&self.tree, key, &self.layers, &self.layer_colors) {
                self.handler.draw(&call);
            }
        }
    }

    /// Destroys every tile and restarts from the root.
    pub fn clear(&mut self) {
        self.normal_map_creator.clear(&mut self.tree);
        for key in self.tree.keys().copied().collect::<Vec<_>>() {
            self.terrain.cancel(&key);
            self.worker.cancel(&key);
        }
        self.tree.clear(&mut self.handler);
        self.tree.insert(Segment::new(
            &self.ellipsoid,
            TileKey::ROOT,
            self.terrain.file_grid_size(),
            self.terrain.grid_size(0),
        ));
        self.rendered.clear();
    }
}

fn submit_mesh(
    worker: &TerrainWorker,
    segment: &mut Segment,
    nmc: &mut NormalMapCreator,
    key: TileKey,
    job: TerrainJob,
) {
    if let Err(e) = worker.submit(key, job.clone()) {
        debug!(zoom = key.zoom, x = key.x, y = key.y, error = %e, "Mesh worker busy, building inline");
        segment.apply_terrain_mesh(build_terrain_mesh(key, &job));
        if !segment.in_the_queue {
            nmc.queue(segment);
        }
    }
}

/// Builds the draw call of a tile, falling back to ancestor textures for layers whose
/// own texture is not loaded yet.
pub fn draw_call(
    tree: &QuadTree,
    key: &TileKey,
    layers: &[Box<dyn Layer>],
    colors: &FxHashMap<u32, PickingColor>,
) -> Option<DrawCall> {
    let segment = tree.segment(key)?;
    let (high, low) = segment.vertex_buffers()?;
    let mut slots = Vec::new();

    for layer in layers {
        if !layer.applies_to(key, segment.extent()) {
            continue;
        }
        let id = layer.id();
        let mut texture = segment.material(id).and_then(|m| m.texture());
        let mut offset = [0.0, 0.0, 1.0, 1.0];
        if texture.is_none() {
            let mut ancestor = key.parent();
            while let Some(a) = ancestor {
                if let Some(s) = tree.segment(&a)
                    && let Some(t) = s.material(id).and_then(|m| m.texture())
                {
                    texture = Some(t);
                    offset = s.extent().offset_of(segment.extent());
                    break;
                }
                ancestor = a.parent();
            }
        }
        slots.push(LayerSlot {
            layer_id: id,
            texture,
            offset,
            opacity: layer.opacity(),
            transparent_color: layer.transparent_color(),
            specular: layer.specular(),
            picking_color: colors.get(&id).map_or([0.0; 3], PickingColor::to_unit),
        });
    }

    Some(DrawCall {
        key: *key,
        vertex_buffer_high: high,
        vertex_buffer_low: low,
        grid_size: segment.grid_size(),
        normal_map: segment.normal_map_texture(),
        layers: slots,
    })
}

/// Terrain lookups for camera collision.
struct TreeSurface<'a> {
    tree: &'a QuadTree,
    ellipsoid: &'a Ellipsoid,
}

impl TerrainSurface for TreeSurface<'_> {
    fn terrain_at(&self, eye: DVec3, lon_lat: &LonLat) -> Option<TerrainHit> {
        if !lon_lat.is_mercator_valid() {
            return None;
        }
        let merc = lon_lat.forward_mercator();
        let mut key = Some(self.tree.find_leaf_containing(&merc)?);
        while let Some(k) = key {
            if let Some(segment) = self.tree.segment(&k)
                && segment.terrain_ready()
            {
                return segment.terrain_point(self.ellipsoid, eye, &merc);
            }
            key = k.parent();
        }
        None
    }
}

/// One traversal of the tile tree.
struct Walk<'a, H: GpuHandler> {
    tree: &'a mut QuadTree,
    camera: &'a PlanetCamera,
    ellipsoid: &'a Ellipsoid,
    terrain: &'a dyn TerrainProvider,
    worker: &'a TerrainWorker,
    nmc: &'a mut NormalMapCreator,
    handler: &'a mut H,
    locks: &'a PlanetLocks,
    lod_size: f64,
    max_zoom: u8,
    max_nodes: usize,
    height_factor: f64,
    frame: u64,
    rendered: Vec<TileKey>,
}

impl<H: GpuHandler> Walk<'_, H> {
    fn node(&mut self, key: TileKey) {
        if self.rendered.len() >= self.max_nodes {
            return;
        }
        let Some(segment) = self.tree.segment(&key) else {
            return;
        };
        let camera = self.camera.camera();
        let camera_inside = self
            .camera
            .lon_lat_merc()
            .is_some_and(|m| segment.extent().is_inside(&m));
        let in_frustum = segment.in_frustum(camera.frustum());

        if !(in_frustum || camera_inside || key.zoom < 3) {
            self.prune(&key);
            return;
        }

        let visible = self.altitude_visible(segment);
        let terrain_ready = segment.terrain_ready();
        let at_max = key.zoom >= self.max_zoom;

        if terrain_ready && (at_max || segment.accept_for_rendering(camera, self.lod_size)) {
            self.prune(&key);
            if visible {
                self.render(key);
            }
        } else if terrain_ready {
            let (ellipsoid, terrain) = (self.ellipsoid, self.terrain);
            self.tree.split(&key, |k| {
                Segment::new(ellipsoid, k, terrain.file_grid_size(), terrain.grid_size(k.zoom))
            });
            if let Some(children) = self.tree.get(&key).and_then(|n| n.children()) {
                for child in children {
                    self.node(child);
                }
            }
        } else if visible {
            self.render(key);
        }
    }

    /// Horizon and distance culling for tiles in view.
    fn altitude_visible(&self, segment: &Segment) -> bool {
        let zoom = segment.key().zoom;
        if zoom < 2 || zoom > 19 || (zoom < 4 && !segment.terrain_ready()) {
            return true;
        }
        let height = self.camera.height();
        let eye = self.camera.camera().eye();
        if height > HORIZON_TEST_HEIGHT {
            let b = self.ellipsoid.polar_radius();
            let horizon = eye.length_squared() - b * b;
            let e = segment.extent_lon_lat();
            [
                LonLat::new(e.west(), e.south(), 0.0),
                LonLat::new(e.west(), e.north(), 0.0),
                LonLat::new(e.east(), e.north(), 0.0),
                LonLat::new(e.east(), e.south(), 0.0),
            ]
            .iter()
            .any(|c| eye.distance_squared(self.ellipsoid.lon_lat_to_cartesian(c)) < horizon)
        } else {
            let s = segment.bsphere();
            eye.distance(s.center) - s.radius < VISIBLE_DISTANCE * height.max(0.0).sqrt()
        }
    }

    fn render(&mut self, key: TileKey) {
        let Some(node) = self.tree.get_mut(&key) else {
            return;
        };
        node.rendered_frame = self.frame;
        let segment = &mut node.segment;

        match segment.load_terrain(self.terrain, &self.locks.terrain) {
            TerrainLoad::Plain => {
                if !segment.in_the_queue {
                    self.nmc.queue(segment);
                }
            }
            TerrainLoad::Extrapolate => self.extrapolate(key),
            TerrainLoad::Requested | TerrainLoad::Waiting => {}
        }
        self.rendered.push(key);
    }

    /// Derives terrain for a tile finer than the provider from its nearest
    /// terrain-ready ancestor.
    fn extrapolate(&mut self, key: TileKey) {
        let mut ancestor = key.parent();
        let source = loop {
            let Some(a) = ancestor else {
                return;
            };
            if let Some(s) = self.tree.segment(&a)
                && s.terrain_ready()
            {
                break (a, s.elevations().map(<[f32]>::to_vec));
            }
            ancestor = a.parent();
        };
        let Some(segment) = self.tree.segment_mut(&key) else {
            return;
        };
        if segment.is_terrain_loading() {
            return;
        }
        match source {
            (a, Some(elevations)) => {
                let job = segment.extrapolate(a, &elevations, self.height_factor);
                submit_mesh(self.worker, segment, &mut *self.nmc, key, job);
            }
            (_, None) => {
                segment.elevations_not_exists();
                if !segment.in_the_queue {
                    self.nmc.queue(segment);
                }
            }
        }
    }

    /// Destroys the subtree below `key` and cancels its pending work.
    fn prune(&mut self, key: &TileKey) {
        let removed = self.tree.merge(key, &mut *self.handler);
        if removed.is_empty() {
            return;
        }
        for k in &removed {
            self.terrain.cancel(k);
            self.worker.cancel(k);
        }
        trace!(zoom = key.zoom, x = key.x, y = key.y, removed = removed.len(), "Merged subtree");
    }
}
