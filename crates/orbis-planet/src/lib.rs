//! Planet surface as a quad tree of terrain tiles.
//!
//! [`Planet`] owns the tile tree and drives it once per frame against a
//! [`GpuHandler`] that turns tile data into draw calls.

mod handler;
mod layer;
mod normal_map;
mod planet;
mod quadtree;
mod segment;

pub use handler::{
    BufferHandle, DrawCall, GpuHandler, HandlerError, LayerSlot, MemoryHandler, TextureDesc,
    TextureFormat, TextureHandle,
};
pub use layer::{Layer, Material, MaterialState, SolidColorLayer, TextureData};
pub use normal_map::{NormalMapCreator, NormalMapParams, average_border};
pub use planet::{FrameStats, LodParams, Planet, PlanetEvent, PlanetParams, draw_call};
pub use quadtree::{Neighbor, QuadNode, QuadTree};
pub use segment::{BOX_CULLING_ZOOM, Segment, TerrainLoad, extrapolate_elevations, split_high_low};
