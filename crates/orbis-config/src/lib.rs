//! Settings for the planet renderer.
//!
//! Settings persist to disk as `config.ron` and can be overridden from the
//! command line. Unknown and missing fields fall back to defaults, so older
//! and newer files keep loading.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    CameraConfig, Config, DebugConfig, LodConfig, NormalMapConfig, TerrainConfig, TerrainKind,
    ViewportConfig, default_config_dir,
};
pub use error::ConfigError;
