//! Imagery layers and their per-tile materials.

use orbis_math::{Extent, TileKey};
use tracing::warn;

use crate::handler::{GpuHandler, HandlerError, TextureDesc, TextureFormat, TextureHandle};

/// Pixels for one tile texture.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureData {
    pub desc: TextureDesc,
    pub pixels: Vec<u8>,
}

/// A raster source draped over the planet.
pub trait Layer {
    fn id(&self) -> u32;

    fn name(&self) -> &str;

    /// Geodetic extent in degrees.
    fn extent(&self) -> Extent {
        Extent::from_bounds(-180.0, -90.0, 180.0, 90.0)
    }

    fn min_zoom(&self) -> u8 {
        0
    }

    fn max_zoom(&self) -> u8 {
        50
    }

    fn is_visible(&self) -> bool {
        true
    }

    fn opacity(&self) -> f32 {
        1.0
    }

    /// Texels of this color are discarded when drawing.
    fn transparent_color(&self) -> Option<[f32; 3]> {
        None
    }

    /// RGB specular weight and shininess.
    fn specular(&self) -> [f32; 4] {
        [0.0; 4]
    }

    fn is_pickable(&self) -> bool {
        true
    }

    /// Texture for a tile, or `None` when the layer has no imagery there.
    fn load_texture(&self, key: TileKey, extent_merc: &Extent) -> Option<TextureData>;

    /// Whether the layer draws on a tile with the given mercator extent.
    fn applies_to(&self, key: &TileKey, extent_merc: &Extent) -> bool {
        self.is_visible()
            && (self.min_zoom()..=self.max_zoom()).contains(&key.zoom)
            && self.extent().forward_mercator().overlaps(extent_merc)
    }
}

/// Single-color layer, mostly a base fill for the globe.
pub struct SolidColorLayer {
    id: u32,
    name: String,
    color: [u8; 4],
    extent: Extent,
    zoom: (u8, u8),
    opacity: f32,
}

impl SolidColorLayer {
    pub fn new(id: u32, name: impl Into<String>, color: [u8; 4]) -> Self {
        Self {
            id,
            name: name.into(),
            color,
            extent: Extent::from_bounds(-180.0, -90.0, 180.0, 90.0),
            zoom: (0, 50),
            opacity: 1.0,
        }
    }

    pub fn with_extent(mut self, extent: Extent) -> Self {
        self.extent = extent;
        self
    }

    pub fn with_zoom_range(mut self, min: u8, max: u8) -> Self {
        self.zoom = (min, max);
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }
}

impl Layer for SolidColorLayer {
    fn id(&self) -> u32 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn extent(&self) -> Extent {
        self.extent
    }

    fn min_zoom(&self) -> u8 {
        self.zoom.0
    }

    fn max_zoom(&self) -> u8 {
        self.zoom.1
    }

    fn opacity(&self) -> f32 {
        self.opacity
    }

    fn load_texture(&self, _key: TileKey, _extent_merc: &Extent) -> Option<TextureData> {
        const SIZE: u32 = 4;
        Some(TextureData {
            desc: TextureDesc::new(SIZE, SIZE, TextureFormat::Rgba8),
            pixels: self.color.repeat((SIZE * SIZE) as usize),
        })
    }
}

/// Load state of a [`Material`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaterialState {
    Empty,
    Ready(TextureHandle),
    /// The layer has nothing for this tile.
    Absent,
}

/// One layer's texture on one tile.
#[derive(Debug)]
pub struct Material {
    layer_id: u32,
    state: MaterialState,
}

impl Material {
    pub fn new(layer_id: u32) -> Self {
        Self {
            layer_id,
            state: MaterialState::Empty,
        }
    }

    pub fn layer_id(&self) -> u32 {
        self.layer_id
    }

    pub fn state(&self) -> MaterialState {
        self.state
    }

    pub fn texture(&self) -> Option<TextureHandle> {
        match self.state {
            MaterialState::Ready(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.state != MaterialState::Empty
    }

    /// Fetches and uploads the layer texture for `key` unless already loaded.
    ///
    /// A layer with no image for the tile leaves the material [`MaterialState::Absent`].
    pub fn load(
        &mut self,
        layer: &dyn Layer,
        key: TileKey,
        extent_merc: &Extent,
        handler: &mut dyn GpuHandler,
    ) -> Result<(), HandlerError> {
        if self.is_loaded() {
            return Ok(());
        }
        self.state = match layer.load_texture(key, extent_merc) {
            Some(data) => {
                let label = format!("{}:{key}", layer.name());
                MaterialState::Ready(handler.create_texture(&label, data.desc, &data.pixels)?)
            }
            None => MaterialState::Absent,
        };
        Ok(())
    }

    /// Deletes the texture and returns to [`MaterialState::Empty`].
    pub fn release(&mut self, handler: &mut dyn GpuHandler) {
        if let MaterialState::Ready(texture) = self.state
            && let Err(e) = handler.delete_texture(texture)
        {
            warn!(layer = self.layer_id, error = %e, "Failed to release layer texture");
        }
        self.state = MaterialState::Empty;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::MemoryHandler;

    #[test]
    fn test_zoom_range_and_extent_gate_layer() {
        let layer = SolidColorLayer::new(1, "europe", [255, 0, 0, 255])
            .with_extent(Extent::from_bounds(0.0, 40.0, 20.0, 60.0))
            .with_zoom_range(2, 10);
        let inside = TileKey::new(3, 4, 2);
        let far = TileKey::new(3, 0, 7);
        assert!(layer.applies_to(&inside, &Extent::from_tile(inside)));
        assert!(!layer.applies_to(&far, &Extent::from_tile(far)));
        let coarse = TileKey::new(1, 1, 0);
        assert!(!layer.applies_to(&coarse, &Extent::from_tile(coarse)));
    }

    #[test]
    fn test_material_loads_once_and_releases() {
        let layer = SolidColorLayer::new(1, "base", [0, 0, 255, 255]);
        let key = TileKey::new(2, 1, 1);
        let mut handler = MemoryHandler::new();
        let mut material = Material::new(1);
        material
            .load(&layer, key, &Extent::from_tile(key), &mut handler)
            .unwrap();
        material
            .load(&layer, key, &Extent::from_tile(key), &mut handler)
            .unwrap();
        assert_eq!(handler.texture_count(), 1);
        assert!(material.texture().is_some());
        material.release(&mut handler);
        assert_eq!(handler.texture_count(), 0);
        assert_eq!(material.state(), MaterialState::Empty);
    }

    #[test]
    fn test_failed_texture_leaves_material_empty() {
        let layer = SolidColorLayer::new(1, "base", [0, 0, 255, 255]);
        let key = TileKey::new(2, 1, 1);
        let mut handler = MemoryHandler::new();
        handler.set_fail_textures(true);
        let mut material = Material::new(1);
        assert!(
            material
                .load(&layer, key, &Extent::from_tile(key), &mut handler)
                .is_err()
        );
        assert!(!material.is_loaded());
    }
}
