//! Multi-octave fractal Brownian motion (fBm) heightmap sampler.
//!
//! Composites octaves of simplex noise over planet-centered coordinates, so the
//! terrain has no seams at tile borders or along the antimeridian.

use glam::DVec3;
use noise::{NoiseFn, Simplex};

/// Configuration for multi-octave fBm noise.
#[derive(Clone, Debug, PartialEq)]
pub struct HeightmapParams {
    /// World seed for deterministic generation.
    pub seed: u32,
    /// Number of noise octaves to composite.
    pub octaves: u32,
    /// Frequency multiplier between successive octaves.
    pub lacunarity: f64,
    /// Amplitude multiplier between successive octaves.
    pub persistence: f64,
    /// Frequency of the first octave, in cycles per meter.
    pub base_frequency: f64,
    /// Amplitude of the first octave, in meters.
    pub amplitude: f64,
}

impl Default for HeightmapParams {
    fn default() -> Self {
        Self {
            seed: 0,
            octaves: 8,
            lacunarity: 2.0,
            persistence: 0.5,
            base_frequency: 1.0 / 2_000_000.0,
            amplitude: 4000.0,
        }
    }
}

pub struct HeightmapSampler {
    noise: Simplex,
    params: HeightmapParams,
}

impl HeightmapSampler {
    pub fn new(params: HeightmapParams) -> Self {
        Self {
            noise: Simplex::new(params.seed),
            params,
        }
    }

    /// Height in meters at a planet-centered point.
    pub fn sample(&self, point: DVec3) -> f64 {
        let mut total = 0.0;
        let mut frequency = self.params.base_frequency;
        let mut amplitude = self.params.amplitude;

        for _ in 0..self.params.octaves {
            let p = point * frequency;
            total += self.noise.get([p.x, p.y, p.z]) * amplitude;
            frequency *= self.params.lacunarity;
            amplitude *= self.params.persistence;
        }

        total
    }

    /// Geometric sum of all octave amplitudes.
    pub fn max_amplitude(&self) -> f64 {
        let mut sum = 0.0;
        let mut amp = self.params.amplitude;
        for _ in 0..self.params.octaves {
            sum += amp;
            amp *= self.params.persistence;
        }
        sum
    }

    pub fn params(&self) -> &HeightmapParams {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_height() {
        let a = HeightmapSampler::new(HeightmapParams::default());
        let b = HeightmapSampler::new(HeightmapParams::default());
        let p = DVec3::new(4_000_000.0, 2_500_000.0, 3_900_000.0);
        assert_eq!(a.sample(p), b.sample(p));
    }

    #[test]
    fn test_different_seed_differs() {
        let a = HeightmapSampler::new(HeightmapParams::default());
        let b = HeightmapSampler::new(HeightmapParams {
            seed: 99,
            ..Default::default()
        });
        let p = DVec3::new(4_000_000.0, 2_500_000.0, 3_900_000.0);
        assert_ne!(a.sample(p), b.sample(p));
    }

    #[test]
    fn test_within_max_amplitude() {
        let s = HeightmapSampler::new(HeightmapParams::default());
        let max = s.max_amplitude();
        for i in 0..500 {
            let t = i as f64 * 0.1;
            let p = DVec3::new(t.cos(), t.sin(), (t * 0.3).sin()) * 6_371_000.0;
            assert!(s.sample(p).abs() <= max + 1e-9);
        }
    }

    #[test]
    fn test_max_amplitude_geometric_sum() {
        let s = HeightmapSampler::new(HeightmapParams {
            octaves: 3,
            amplitude: 100.0,
            persistence: 0.5,
            ..Default::default()
        });
        assert!((s.max_amplitude() - 175.0).abs() < 1e-12);
    }
}
