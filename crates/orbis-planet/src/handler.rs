//! Opaque GPU resource contract.
//!
//! Tiles only ever create, delete and draw with handles. [`MemoryHandler`] keeps the
//! bookkeeping in memory for headless runs and tests.

use orbis_math::TileKey;
use rustc_hash::FxHashMap;

/// Opaque id of a vertex buffer owned by a [`GpuHandler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Opaque id of a texture owned by a [`GpuHandler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureFormat {
    Rgba8,
    /// Three 32-bit floats per texel, used for normal maps.
    Rgb32Float,
}

impl TextureFormat {
    pub fn bytes_per_texel(self) -> usize {
        match self {
            TextureFormat::Rgba8 => 4,
            TextureFormat::Rgb32Float => 12,
        }
    }
}

/// Size and texel format of a texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

impl TextureDesc {
    pub fn new(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            format,
        }
    }

    pub fn byte_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_texel()
    }
}

/// Failures reported by a [`GpuHandler`].
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("texture dimensions must be non-zero, got {width}x{height}")]
    ZeroDimensions { width: u32, height: u32 },

    #[error("texture data size ({actual}) does not match expected ({expected}) for {width}x{height} {format:?}")]
    DataSizeMismatch {
        actual: usize,
        expected: usize,
        width: u32,
        height: u32,
        format: TextureFormat,
    },

    #[error("buffer '{0}' has no data")]
    EmptyBuffer(String),

    #[error("unknown buffer handle {0:?}")]
    UnknownBuffer(BufferHandle),

    #[error("unknown texture handle {0:?}")]
    UnknownTexture(TextureHandle),

    #[error("GPU resource creation failed: {0}")]
    Creation(String),
}

/// Per-layer inputs of one tile draw.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerSlot {
    pub layer_id: u32,
    pub texture: Option<TextureHandle>,
    /// `[dx, dy, sx, sy]` mapping tile UV into the texture's UV space.
    pub offset: [f32; 4],
    pub opacity: f32,
    pub transparent_color: Option<[f32; 3]>,
    pub specular: [f32; 4],
    pub picking_color: [f32; 3],
}

/// One multi-layer draw of a tile.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawCall {
    pub key: TileKey,
    /// High and low float parts of the doubled vertex positions.
    pub vertex_buffer_high: BufferHandle,
    pub vertex_buffer_low: BufferHandle,
    pub grid_size: usize,
    pub normal_map: Option<TextureHandle>,
    pub layers: Vec<LayerSlot>,
}

/// GPU resource and draw backend.
///
/// The renderer core never touches a graphics API directly. It creates and deletes
/// resources through this trait and submits one [`DrawCall`] per rendered tile.
pub trait GpuHandler {
    fn create_buffer(&mut self, label: &str, data: &[u8]) -> Result<BufferHandle, HandlerError>;

    fn delete_buffer(&mut self, handle: BufferHandle) -> Result<(), HandlerError>;

    fn create_texture(
        &mut self,
        label: &str,
        desc: TextureDesc,
        data: &[u8],
    ) -> Result<TextureHandle, HandlerError>;

    fn delete_texture(&mut self, handle: TextureHandle) -> Result<(), HandlerError>;

    fn draw(&mut self, call: &DrawCall);
}

fn validate_texture(desc: &TextureDesc, data: &[u8]) -> Result<(), HandlerError> {
    if desc.width == 0 || desc.height == 0 {
        return Err(HandlerError::ZeroDimensions {
            width: desc.width,
            height: desc.height,
        });
    }
    let expected = desc.byte_size();
    if data.len() != expected {
        return Err(HandlerError::DataSizeMismatch {
            actual: data.len(),
            expected,
            width: desc.width,
            height: desc.height,
            format: desc.format,
        });
    }
    Ok(())
}

/// Records live handles and draw calls instead of talking to a GPU.
#[derive(Debug, Default)]
pub struct MemoryHandler {
    next_id: u64,
    buffers: FxHashMap<BufferHandle, usize>,
    textures: FxHashMap<TextureHandle, TextureDesc>,
    draws: Vec<DrawCall>,
    fail_textures: bool,
    buffer_limit: Option<usize>,
}

impl MemoryHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following texture creation fail.
    pub fn set_fail_textures(&mut self, fail: bool) {
        self.fail_textures = fail;
    }

    /// Fails buffer creation once `limit` buffers are live.
    pub fn set_buffer_limit(&mut self, limit: Option<usize>) {
        self.buffer_limit = limit;
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Bytes held by live buffers.
    pub fn buffer_bytes(&self) -> usize {
        self.buffers.values().sum()
    }

    pub fn has_texture(&self, handle: TextureHandle) -> bool {
        self.textures.contains_key(&handle)
    }

    pub fn draws(&self) -> &[DrawCall] {
        &self.draws
    }

    /// Returns and forgets the draw calls recorded so far.
    pub fn take_draws(&mut self) -> Vec<DrawCall> {
        std::mem::take(&mut self.draws)
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl GpuHandler for MemoryHandler {
    fn create_buffer(&mut self, label: &str, data: &[u8]) -> Result<BufferHandle, HandlerError> {
        if data.is_empty() {
            return Err(HandlerError::EmptyBuffer(label.to_string()));
        }
        if self.buffer_limit.is_some_and(|limit| self.buffers.len() >= limit) {
            return Err(HandlerError::Creation(label.to_string()));
        }
        let handle = BufferHandle(self.next());
        self.buffers.insert(handle, data.len());
        Ok(handle)
    }

    fn delete_buffer(&mut self, handle: BufferHandle) -> Result<(), HandlerError> {
        self.buffers
            .remove(&handle)
            .map(|_| ())
            .ok_or(HandlerError::UnknownBuffer(handle))
    }

    fn create_texture(
        &mut self,
        label: &str,
        desc: TextureDesc,
        data: &[u8],
    ) -> Result<TextureHandle, HandlerError> {
        if self.fail_textures {
            return Err(HandlerError::Creation(label.to_string()));
        }
        validate_texture(&desc, data)?;
        let handle = TextureHandle(self.next());
        self.textures.insert(handle, desc);
        Ok(handle)
    }

    fn delete_texture(&mut self, handle: TextureHandle) -> Result<(), HandlerError> {
        self.textures
            .remove(&handle)
            .map(|_| ())
            .ok_or(HandlerError::UnknownTexture(handle))
    }

    fn draw(&mut self, call: &DrawCall) {
        self.draws.push(call.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffers_are_tracked_until_deleted() {
        let mut h = MemoryHandler::new();
        let data: Vec<f32> = vec![0.0; 12];
        let b = h.create_buffer("tile", bytemuck::cast_slice(&data)).unwrap();
        assert_eq!(h.buffer_count(), 1);
        assert_eq!(h.buffer_bytes(), 48);
        h.delete_buffer(b).unwrap();
        assert_eq!(h.buffer_count(), 0);
        assert!(matches!(h.delete_buffer(b), Err(HandlerError::UnknownBuffer(_))));
    }

    #[test]
    fn test_texture_size_is_validated() {
        let mut h = MemoryHandler::new();
        let desc = TextureDesc::new(2, 2, TextureFormat::Rgba8);
        assert!(matches!(
            h.create_texture("t", desc, &[0u8; 15]),
            Err(HandlerError::DataSizeMismatch { expected: 16, .. })
        ));
        let zero = TextureDesc::new(0, 2, TextureFormat::Rgba8);
        assert!(matches!(
            h.create_texture("t", zero, &[]),
            Err(HandlerError::ZeroDimensions { .. })
        ));
        let t = h.create_texture("t", desc, &[0u8; 16]).unwrap();
        assert!(h.has_texture(t));
    }

    #[test]
    fn test_injected_texture_failure() {
        let mut h = MemoryHandler::new();
        h.set_fail_textures(true);
        let desc = TextureDesc::new(1, 1, TextureFormat::Rgba8);
        assert!(h.create_texture("t", desc, &[0u8; 4]).is_err());
        assert_eq!(h.texture_count(), 0);
    }

    #[test]
    fn test_buffer_limit() {
        let mut h = MemoryHandler::new();
        h.set_buffer_limit(Some(1));
        h.create_buffer("a", &[1]).unwrap();
        assert!(matches!(h.create_buffer("b", &[1]), Err(HandlerError::Creation(_))));
        h.set_buffer_limit(None);
        assert!(h.create_buffer("b", &[1]).is_ok());
    }

    #[test]
    fn test_empty_buffer_rejected() {
        let mut h = MemoryHandler::new();
        assert!(matches!(h.create_buffer("x", &[]), Err(HandlerError::EmptyBuffer(_))));
    }
}
