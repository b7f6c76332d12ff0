//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::{Config, TerrainKind};

/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "orbis", about = "Headless planet terrain renderer")]
pub struct CliArgs {
    /// Viewport width.
    #[arg(long)]
    pub width: Option<u32>,

    /// Viewport height.
    #[arg(long)]
    pub height: Option<u32>,

    /// Number of frames to run.
    #[arg(long)]
    pub frames: Option<u64>,

    /// Use a flat ellipsoid instead of generated terrain.
    #[arg(long)]
    pub flat: bool,

    /// Terrain seed.
    #[arg(long)]
    pub seed: Option<u32>,

    /// Deepest tile zoom.
    #[arg(long)]
    pub max_zoom: Option<u8>,

    /// Fly to this longitude/latitude/height once started, e.g. `--fly-to 10,45,5000`.
    #[arg(long, value_delimiter = ',', num_args = 3)]
    pub fly_to: Option<Vec<f64>>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(w) = args.width {
            self.viewport.width = w;
        }
        if let Some(h) = args.height {
            self.viewport.height = h;
        }
        if let Some(frames) = args.frames {
            self.debug.frames = frames;
        }
        if args.flat {
            self.terrain.kind = TerrainKind::Empty;
        }
        if let Some(seed) = args.seed {
            self.terrain.seed = seed;
        }
        if let Some(zoom) = args.max_zoom {
            self.lod.max_zoom = zoom;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            width: Some(1920),
            flat: true,
            seed: Some(7),
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.viewport.width, 1920);
        assert_eq!(config.terrain.kind, TerrainKind::Empty);
        assert_eq!(config.terrain.seed, 7);
        assert_eq!(config.viewport.height, 720);
        assert_eq!(config.lod.max_zoom, 22);
    }

    #[test]
    fn test_cli_no_override() {
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parse_fly_to() {
        let args = CliArgs::parse_from(["orbis", "--fly-to", "10,45.5,5000", "--frames", "20"]);
        assert_eq!(args.fly_to, Some(vec![10.0, 45.5, 5000.0]));
        assert_eq!(args.frames, Some(20));
    }
}
