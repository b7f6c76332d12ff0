//! Elevation provider contract.

use crossbeam_channel::{Receiver, Sender, unbounded};
use orbis_math::TileKey;

use crate::TerrainError;

/// Answer to one elevation request.
#[derive(Clone, Debug, PartialEq)]
pub enum ElevationResponse {
    /// `(file_grid_size + 1)²` heights in meters, row-major from the north-west node.
    Exists { key: TileKey, elevations: Vec<f32> },
    /// The provider has no data for this tile.
    NotExists { key: TileKey },
}

impl ElevationResponse {
    pub fn key(&self) -> TileKey {
        match self {
            ElevationResponse::Exists { key, .. } | ElevationResponse::NotExists { key } => *key,
        }
    }
}

/// Asynchronous elevation source.
///
/// Every accepted [`request`](TerrainProvider::request) eventually produces exactly one
/// response from [`drain`](TerrainProvider::drain), unless the key is cancelled first.
pub trait TerrainProvider {
    /// Coarsest zoom with elevation data.
    fn min_zoom(&self) -> u8;

    /// Finest zoom with elevation data. Deeper tiles reuse ancestor elevations.
    fn max_zoom(&self) -> u8;

    /// Cells per side of a returned elevation grid.
    fn file_grid_size(&self) -> usize;

    /// Cells per side of the rendered terrain grid at `zoom`.
    fn grid_size(&self, zoom: u8) -> usize {
        let _ = zoom;
        self.file_grid_size()
    }

    /// `true` for providers that never return elevations.
    fn is_empty(&self) -> bool {
        false
    }

    fn request(&self, key: TileKey) -> Result<(), TerrainError>;

    fn cancel(&self, key: &TileKey);

    fn is_pending(&self, key: &TileKey) -> bool;

    /// Responses that arrived since the last call.
    fn drain(&self) -> Vec<ElevationResponse>;
}

/// Provider for a smooth ellipsoid: answers every request with `NotExists`.
pub struct EmptyTerrain {
    sender: Sender<ElevationResponse>,
    receiver: Receiver<ElevationResponse>,
}

impl EmptyTerrain {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }
}

impl Default for EmptyTerrain {
    fn default() -> Self {
        Self::new()
    }
}

impl TerrainProvider for EmptyTerrain {
    fn min_zoom(&self) -> u8 {
        50
    }

    fn max_zoom(&self) -> u8 {
        50
    }

    fn file_grid_size(&self) -> usize {
        32
    }

    fn is_empty(&self) -> bool {
        true
    }

    fn request(&self, key: TileKey) -> Result<(), TerrainError> {
        self.sender
            .send(ElevationResponse::NotExists { key })
            .map_err(|_| TerrainError::Disconnected)
    }

    fn cancel(&self, _key: &TileKey) {}

    fn is_pending(&self, _key: &TileKey) -> bool {
        false
    }

    fn drain(&self) -> Vec<ElevationResponse> {
        self.receiver.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_terrain_answers_not_exists() {
        let terrain = EmptyTerrain::new();
        assert!(terrain.is_empty());
        let key = TileKey::new(4, 3, 5);
        terrain.request(key).unwrap();
        let responses = terrain.drain();
        assert_eq!(responses, vec![ElevationResponse::NotExists { key }]);
        assert!(terrain.drain().is_empty());
    }

    #[test]
    fn test_response_key() {
        let key = TileKey::new(2, 1, 1);
        let r = ElevationResponse::Exists {
            key,
            elevations: vec![0.0; 4],
        };
        assert_eq!(r.key(), key);
    }

    #[test]
    fn test_default_grid_size_follows_file_grid() {
        let terrain = EmptyTerrain::default();
        assert_eq!(terrain.grid_size(7), 32);
    }
}
