//! Lights and fog.
//!
//! The ambient backdrop uses an ambient term, up to four point lights and
//! exponential-squared fog; the detail viewer uses a single hemisphere light.
//! Everything is flattened into one [`LightingUniforms`] block per frame.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::material::Color;

pub const MAX_POINT_LIGHTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    pub color: Color,
    pub intensity: f32,
}

/// Sky colour from above, ground colour from below, blended by normal.y.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HemisphereLight {
    pub sky: Color,
    pub ground: Color,
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub color: Color,
    pub intensity: f32,
    /// Cutoff distance; 0 means unlimited.
    pub distance: f32,
    pub decay: f32,
    pub position: Vec3,
}

/// Exponential-squared fog.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fog {
    pub color: Color,
    pub density: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lighting {
    pub ambient: Option<AmbientLight>,
    pub hemisphere: Option<HemisphereLight>,
    pub points: Vec<PointLight>,
    pub fog: Option<Fog>,
}

impl Lighting {
    pub fn to_uniforms(&self) -> LightingUniforms {
        let mut uniforms = LightingUniforms::default();

        if let Some(ambient) = &self.ambient {
            let c = ambient.color.scaled(ambient.intensity);
            uniforms.ambient = [c[0], c[1], c[2], 1.0];
        }

        if let Some(hemi) = &self.hemisphere {
            let sky = hemi.sky.scaled(hemi.intensity);
            let ground = hemi.ground.scaled(hemi.intensity);
            uniforms.hemisphere_sky = [sky[0], sky[1], sky[2], 1.0];
            uniforms.hemisphere_ground = [ground[0], ground[1], ground[2], 1.0];
        }

        if let Some(fog) = &self.fog {
            uniforms.fog = [fog.color.0[0], fog.color.0[1], fog.color.0[2], fog.density];
        }

        if self.points.len() > MAX_POINT_LIGHTS {
            log::warn!(
                "{} point lights requested, only {} are drawn",
                self.points.len(),
                MAX_POINT_LIGHTS
            );
        }
        for (i, light) in self.points.iter().take(MAX_POINT_LIGHTS).enumerate() {
            let c = light.color.scaled(light.intensity);
            uniforms.point_position[i] = [light.position.x, light.position.y, light.position.z, light.distance];
            uniforms.point_color[i] = [c[0], c[1], c[2], light.decay];
        }
        uniforms.counts = [self.points.len().min(MAX_POINT_LIGHTS) as u32, 0, 0, 0];

        uniforms
    }
}

/// GPU-ready lighting uniforms. 208 bytes.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct LightingUniforms {
    /// rgb * intensity
    pub ambient: [f32; 4],
    pub hemisphere_sky: [f32; 4],
    pub hemisphere_ground: [f32; 4],
    /// rgb, a = density (0 disables fog)
    pub fog: [f32; 4],
    /// x = number of point lights
    pub counts: [u32; 4],
    /// xyz, w = cutoff distance
    pub point_position: [[f32; 4]; MAX_POINT_LIGHTS],
    /// rgb * intensity, w = decay
    pub point_color: [[f32; 4]; MAX_POINT_LIGHTS],
}

impl Default for LightingUniforms {
    fn default() -> Self {
        Self::zeroed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_lights_capped() {
        let light = PointLight {
            color: Color::WHITE,
            intensity: 2.0,
            distance: 10.0,
            decay: 1.5,
            position: Vec3::new(1.0, 2.0, 3.0),
        };
        let lighting = Lighting {
            points: vec![light; 6],
            ..Default::default()
        };

        let uniforms = lighting.to_uniforms();
        assert_eq!(uniforms.counts[0], 4);
        assert_eq!(uniforms.point_position[0], [1.0, 2.0, 3.0, 10.0]);
        assert_eq!(uniforms.point_color[3][3], 1.5);
    }

    #[test]
    fn test_no_fog_means_zero_density() {
        assert_eq!(Lighting::default().to_uniforms().fog[3], 0.0);
    }

    #[test]
    fn test_uniforms_size() {
        assert_eq!(std::mem::size_of::<LightingUniforms>(), 208);
    }
}
