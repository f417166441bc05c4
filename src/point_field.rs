//! Deterministic scatter for the ambient backdrop: a seeded RNG and the
//! coloured point field drifting behind the shapes.

use std::ops::Range;

use crate::gpu::mesh::PointVertex;
use crate::material::Color;

/// xorshift64 generator. Same seed, same scene.
#[derive(Debug, Clone)]
pub struct SceneRng {
    state: u64,
}

impl SceneRng {
    pub fn new(seed: u64) -> Self {
        // Seed 0 is degenerate for xorshift (stays at zero forever)
        let state = if seed == 0 { 0x5DEECE66D } else { seed };
        Self { state }
    }

    /// Uniform in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        // Top 24 bits give an exactly representable f32 below 1.0
        (self.state >> 40) as f32 / (1u64 << 24) as f32
    }

    /// Uniform in `range`.
    pub fn range(&mut self, range: Range<f32>) -> f32 {
        range.start + (range.end - range.start) * self.next_f32()
    }
}

/// Spawn volume and colour ranges of a point field.
#[derive(Debug, Clone, PartialEq)]
pub struct PointFieldConfig {
    pub count: usize,
    pub x: Range<f32>,
    pub y: Range<f32>,
    pub z: Range<f32>,
    pub hue: Range<f32>,
    pub saturation: f32,
    pub lightness: Range<f32>,
    pub size: f32,
    pub opacity: f32,
}

impl Default for PointFieldConfig {
    fn default() -> Self {
        Self {
            count: 200,
            x: -6.0..6.0,
            y: -3.0..3.0,
            z: -8.0..-2.0,
            hue: 0.6..0.75,
            saturation: 0.82,
            lightness: 0.62..0.82,
            size: 0.06,
            opacity: 0.7,
        }
    }
}

/// Scatter `config.count` points with per-point colours.
pub fn scatter(config: &PointFieldConfig, rng: &mut SceneRng) -> Vec<PointVertex> {
    (0..config.count)
        .map(|_| {
            let position = [
                rng.range(config.x.clone()),
                rng.range(config.y.clone()),
                rng.range(config.z.clone()),
            ];
            let hue = rng.range(config.hue.clone());
            let lightness = rng.range(config.lightness.clone());
            let color = Color::from_hsl(hue, config.saturation, lightness);
            PointVertex::new(position, color.0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_seed_is_not_stuck() {
        let mut rng = SceneRng::new(0);
        let a = rng.next_f32();
        let b = rng.next_f32();
        assert_ne!(a, b);
    }

    #[test]
    fn test_values_in_unit_interval() {
        let mut rng = SceneRng::new(42);
        for _ in 0..10_000 {
            let v = rng.next_f32();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn test_scatter_stays_in_volume() {
        let config = PointFieldConfig::default();
        let points = scatter(&config, &mut SceneRng::new(7));
        assert_eq!(points.len(), 200);
        for p in &points {
            assert!(config.x.contains(&p.position[0]));
            assert!(config.y.contains(&p.position[1]));
            assert!(config.z.contains(&p.position[2]));
        }
    }

    #[test]
    fn test_same_seed_same_field() {
        let config = PointFieldConfig::default();
        let a = scatter(&config, &mut SceneRng::new(99));
        let b = scatter(&config, &mut SceneRng::new(99));
        assert_eq!(a, b);
    }
}
