//! Time-sliced normal-map generation and seam repair.
//!
//! Tiles wait in a queue until the render thread has time for them. Processing a
//! tile first reconciles its border normals with its neighbors, then uploads the
//! normals as a texture.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use glam::Vec3;
use orbis_core::Lock;
use orbis_math::{Side, TileKey};
use tracing::{debug, trace};

use crate::handler::GpuHandler;
use crate::quadtree::{Neighbor, QuadTree};
use crate::segment::Segment;

/// Per-frame limits of the [`NormalMapCreator`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalMapParams {
    /// Wall-clock time one frame may spend on normal maps.
    pub frame_budget_ms: f64,
    /// Upper bound on tiles taken from the queue per frame.
    pub max_per_frame: usize,
}

impl Default for NormalMapParams {
    fn default() -> Self {
        Self {
            frame_budget_ms: 0.25,
            max_per_frame: 64,
        }
    }
}

/// Frame-budgeted queue that equalizes tile borders and uploads normal-map textures.
pub struct NormalMapCreator {
    queue: VecDeque<TileKey>,
    lock: Lock,
    params: NormalMapParams,
}

impl NormalMapCreator {
    /// `lock` pauses processing while any key holds it.
    pub fn new(lock: Lock, params: NormalMapParams) -> Self {
        Self {
            queue: VecDeque::new(),
            lock,
            params,
        }
    }

    /// Appends a tile to the back of the queue.
    pub fn queue(&mut self, segment: &mut Segment) {
        segment.in_the_queue = true;
        self.queue.push_back(segment.key());
    }

    /// Puts a tile at the front of the queue.
    pub fn unshift(&mut self, segment: &mut Segment) {
        segment.in_the_queue = true;
        self.queue.push_front(segment.key());
    }

    pub fn queue_size(&self) -> usize {
        self.queue.len()
    }

    pub fn is_queued(&self, key: &TileKey) -> bool {
        self.queue.contains(key)
    }

    /// Empties the queue and clears the queued flag of every tile in it.
    pub fn clear(&mut self, tree: &mut QuadTree) {
        for key in self.queue.drain(..) {
            if let Some(segment) = tree.segment_mut(&key) {
                segment.in_the_queue = false;
            }
        }
    }

    /// Processes queued tiles while the lock is free, within the frame budget.
    ///
    /// Tiles whose neighbors are still loading terrain go back to the queue, as do
    /// tiles whose texture upload fails. Returns the number of textures created.
    pub fn frame(&mut self, tree: &mut QuadTree, handler: &mut dyn GpuHandler, min_zoom: u8) -> usize {
        if self.queue.is_empty() {
            return 0;
        }
        let start = Instant::now();
        let budget = Duration::from_secs_f64(self.params.frame_budget_ms / 1000.0);
        let mut taken = 0;
        let mut created = 0;
        let mut retry = Vec::new();

        while self.lock.is_free() && taken < self.params.max_per_frame && start.elapsed() < budget {
            let Some(key) = self.queue.pop_front() else {
                break;
            };
            taken += 1;
            let Some(segment) = tree.segment_mut(&key) else {
                continue;
            };
            segment.in_the_queue = false;
            if !segment.terrain_ready() {
                continue;
            }

            if key.zoom > min_zoom && neighbors_loading(tree, &key) {
                retry.push(key);
                continue;
            }

            for side in Side::ALL {
                self.equalize_edge(tree, &key, side, handler);
            }

            let Some(segment) = tree.segment_mut(&key) else {
                continue;
            };
            match segment.create_normal_map_texture(handler) {
                Ok(()) => created += 1,
                Err(e) => {
                    debug!(zoom = key.zoom, x = key.x, y = key.y, error = %e, "Normal map upload failed, requeueing");
                    retry.push(key);
                }
            }
        }

        for key in retry {
            if let Some(segment) = tree.segment_mut(&key)
                && !segment.in_the_queue
            {
                self.queue(segment);
            }
        }

        if created > 0 {
            trace!(created, queued = self.queue.len(), "Normal maps created");
        }
        created
    }

    /// Averages the border normals of `key` with its neighbor across `side`.
    ///
    /// A side is recorded as done only once it has been averaged, so a tile whose
    /// neighbor has no terrain yet tries again the next time it is processed. When
    /// the neighbor is finer, the leaves along the border are reset and queued so
    /// each of them averages against this tile.
    fn equalize_edge(&mut self, tree: &mut QuadTree, key: &TileKey, side: Side, handler: &mut dyn GpuHandler) {
        let neighbor = match tree.neighbor(key, side) {
            Some(Neighbor::Same(k)) | Some(Neighbor::Coarser(k)) => k,
            Some(Neighbor::Finer(children)) => {
                self.dispatch_finer(tree, key, side, children);
                return;
            }
            None => return,
        };

        let Some((a, b)) = tree.segment_pair_mut(key, &neighbor) else {
            return;
        };
        if !(b.terrain_ready() && b.terrain_exists()) {
            return;
        }
        if a.applied_neighbors_zoom[side.index()] == neighbor.zoom {
            return;
        }
        if !average_border(a, b, side) {
            return;
        }
        a.applied_neighbors_zoom[side.index()] = neighbor.zoom;
        if neighbor.zoom == key.zoom {
            b.applied_neighbors_zoom[side.opposite().index()] = key.zoom;
        }

        if !b.in_the_queue
            && b.normal_map_ready()
            && let Err(e) = b.create_normal_map_texture(handler)
        {
            debug!(error = %e, "Neighbor normal map refresh failed, requeueing");
            self.queue(b);
        }
    }

    /// Hands a border with finer tiles over to those tiles, once per terrain of `key`.
    fn dispatch_finer(&mut self, tree: &mut QuadTree, key: &TileKey, side: Side, children: [TileKey; 2]) {
        let marker = key.zoom + 1;
        match tree.segment_mut(key) {
            Some(segment) if segment.applied_neighbors_zoom[side.index()] != marker => {
                segment.applied_neighbors_zoom[side.index()] = marker;
            }
            _ => return,
        }
        for leaf in border_leaves(tree, children, side.opposite()) {
            if let Some(s) = tree.segment_mut(&leaf)
                && s.terrain_ready()
                && s.terrain_exists()
            {
                s.applied_neighbors_zoom[side.opposite().index()] = 0;
                if !s.in_the_queue {
                    self.queue(s);
                }
            }
        }
    }
}

/// Leaves below `start` that touch `side` of their ancestors.
fn border_leaves(tree: &QuadTree, start: [TileKey; 2], side: Side) -> Vec<TileKey> {
    let mut leaves = Vec::new();
    let mut stack = start.to_vec();
    while let Some(k) = stack.pop() {
        match tree.get(&k) {
            Some(node) if node.is_leaf() => leaves.push(k),
            Some(_) => stack.extend(k.children_on_side(side)),
            None => {}
        }
    }
    leaves
}

fn neighbors_loading(tree: &QuadTree, key: &TileKey) -> bool {
    Side::ALL.into_iter().any(|side| {
        let keys: Vec<TileKey> = match tree.neighbor(key, side) {
            Some(Neighbor::Same(k)) | Some(Neighbor::Coarser(k)) => vec![k],
            Some(Neighbor::Finer(ks)) => ks.to_vec(),
            None => Vec::new(),
        };
        keys.iter()
            .filter_map(|k| tree.segment(k))
            .any(Segment::is_terrain_loading)
    })
}

/// Replaces both sides of a shared border with the normalized sum of the two normals.
///
/// `b` must be at the same zoom as `a` or coarser. Against a coarser tile only the
/// nodes of `a` that coincide with nodes of `b` are averaged; the nodes in between
/// take the interpolated normal of the surrounding coarse nodes. Returns false when
/// either normal grid has an unexpected size.
pub fn average_border(a: &mut Segment, b: &mut Segment, side: Side) -> bool {
    let size = a.file_grid_size();
    let row = size + 1;
    let nodes = row * row * 3;
    if a.normal_map_normals.len() != nodes || b.normal_map_normals.len() != nodes {
        return false;
    }
    let (ka, kb) = (a.key(), b.key());
    if kb.zoom > ka.zoom {
        return false;
    }

    let i_a = match side {
        Side::North | Side::West => 0,
        Side::South | Side::East => size,
    };
    let i_b = size - i_a;
    let scale = 1usize << (ka.zoom - kb.zoom);
    let along = if side.is_vertical() { ka.y } else { ka.x } as usize;
    let offset = (along % scale) * size;

    let index = |fixed: usize, k: usize| {
        let i = if side.is_vertical() { k * row + fixed } else { fixed * row + k };
        i * 3
    };
    let get = |normals: &[f32], i: usize| Vec3::from_slice(&normals[i..i + 3]);

    for k in (0..=size).filter(|k| (offset + k) % scale == 0) {
        let ia = index(i_a, k);
        let ib = index(i_b, (offset + k) / scale);
        let n = (get(&a.normal_map_normals, ia) + get(&b.normal_map_normals, ib)).normalize_or_zero();
        a.normal_map_normals[ia..ia + 3].copy_from_slice(&n.to_array());
        b.normal_map_normals[ib..ib + 3].copy_from_slice(&n.to_array());
    }

    for k in (0..=size).filter(|k| (offset + k) % scale != 0) {
        let pos = offset + k;
        let m = pos / scale;
        let t = (pos % scale) as f32 / scale as f32;
        let n0 = get(&b.normal_map_normals, index(i_b, m));
        let n1 = get(&b.normal_map_normals, index(i_b, m + 1));
        let ia = index(i_a, k);
        a.normal_map_normals[ia..ia + 3].copy_from_slice(&n0.lerp(n1, t).normalize_or_zero().to_array());
    }
    true
}
