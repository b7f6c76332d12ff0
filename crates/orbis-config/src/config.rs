//! Configuration sections and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.ron";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub viewport: ViewportConfig,
    pub camera: CameraConfig,
    pub lod: LodConfig,
    pub terrain: TerrainConfig,
    pub normal_map: NormalMapConfig,
    pub debug: DebugConfig,
}

/// Size of the drawing surface in pixels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ViewportConfig {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in degrees.
    pub view_angle: f64,
    pub near: f64,
    pub far: f64,
    /// Lowest eye height above terrain in meters.
    pub min_altitude: f64,
    /// Highest eye height above the ellipsoid in meters.
    pub max_altitude: f64,
    /// Frames a flight takes.
    pub fly_frames: usize,
    pub start_lon: f64,
    pub start_lat: f64,
    pub start_height: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LodConfig {
    /// Scales the on-screen tile size thresholds. Below 1 refines more.
    pub lod_ratio: f64,
    pub max_zoom: u8,
    pub max_rendered_nodes: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TerrainKind {
    /// A perfect ellipsoid.
    Empty,
    /// Noise-generated elevations.
    Procedural,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerrainConfig {
    pub kind: TerrainKind,
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// Cells per side of an elevation tile.
    pub file_grid_size: usize,
    pub seed: u32,
    pub height_factor: f64,
    /// 0 picks one thread per spare core.
    pub worker_threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NormalMapConfig {
    pub frame_budget_ms: f64,
    pub max_per_frame: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Frames the headless demo runs.
    pub frames: u64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            view_angle: 47.0,
            near: 1.0,
            far: 1.0e8,
            min_altitude: 5.0,
            max_altitude: 20_000_000.0,
            fly_frames: 50,
            start_lon: 0.0,
            start_lat: 0.0,
            start_height: 10_000_000.0,
        }
    }
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            lod_ratio: 1.0,
            max_zoom: 22,
            max_rendered_nodes: 1000,
        }
    }
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            kind: TerrainKind::Procedural,
            min_zoom: 2,
            max_zoom: 14,
            file_grid_size: 32,
            seed: 0,
            height_factor: 1.0,
            worker_threads: 0,
        }
    }
}

impl Default for NormalMapConfig {
    fn default() -> Self {
        Self {
            frame_budget_ms: 0.25,
            max_per_frame: 64,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            frames: 300,
        }
    }
}

/// Per-user config directory, `None` when the platform has none.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("orbis"))
}

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(config_dir.join(CONFIG_FILE), serialized).map_err(ConfigError::WriteError)
    }

    /// Returns `Some(new_config)` if the file on disk differs from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let contents = std::fs::read_to_string(config_dir.join(CONFIG_FILE))
            .map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let ron_str =
            ron::ser::to_string_pretty(&Config::default(), ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("width: 1280"));
        assert!(ron_str.contains("kind: Procedural"));
        assert!(ron_str.contains("max_rendered_nodes: 1000"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.terrain.kind = TerrainKind::Empty;
        config.camera.start_lat = 45.5;
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_section_uses_default() {
        let config: Config = ron::from_str("(viewport: (width: 800), debug: (frames: 5))").unwrap();
        assert_eq!(config.viewport.width, 800);
        assert_eq!(config.viewport.height, 720);
        assert_eq!(config.debug.frames, 5);
        assert_eq!(config.terrain, TerrainConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.lod.max_zoom = 18;
        config.normal_map.max_per_frame = 8;
        config.save(dir.path()).unwrap();
        assert_eq!(Config::load_or_create(dir.path()).unwrap(), config);
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        assert!(config.reload(dir.path()).unwrap().is_none());

        let mut modified = config.clone();
        modified.terrain.seed = 42;
        modified.save(dir.path()).unwrap();
        let reloaded = config.reload(dir.path()).unwrap();
        assert_eq!(reloaded.map(|c| c.terrain.seed), Some(42));
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.ron"), "{{not valid}}").unwrap();
        assert!(matches!(
            Config::load_or_create(dir.path()),
            Err(ConfigError::ParseError(_))
        ));
    }
}
