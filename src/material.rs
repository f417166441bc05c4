//! Colours and surface materials.

use bytemuck::{Pod, Zeroable};

/// Linear RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Color(pub [f32; 3]);

fn srgb_to_linear(c: f32) -> f32 {
    if c < 0.04045 {
        c * 0.0773993808
    } else {
        (c * 0.9478672986 + 0.0521327014).powf(2.4)
    }
}

impl Color {
    pub const WHITE: Color = Color([1.0, 1.0, 1.0]);

    /// From a `0xRRGGBB` sRGB hex value.
    pub fn from_hex(hex: u32) -> Self {
        let channel = |shift: u32| srgb_to_linear(((hex >> shift) & 0xff) as f32 / 255.0);
        Self([channel(16), channel(8), channel(0)])
    }

    /// From sRGB hue, saturation and lightness, all in 0..=1.
    pub fn from_hsl(h: f32, s: f32, l: f32) -> Self {
        let h = h.rem_euclid(1.0);
        let s = s.clamp(0.0, 1.0);
        let l = l.clamp(0.0, 1.0);

        if s == 0.0 {
            return Self([srgb_to_linear(l); 3]);
        }

        let p = if l <= 0.5 { l * (1.0 + s) } else { l + s - l * s };
        let q = 2.0 * l - p;

        let hue_to_rgb = |mut t: f32| {
            if t < 0.0 {
                t += 1.0;
            }
            if t > 1.0 {
                t -= 1.0;
            }
            if t < 1.0 / 6.0 {
                return q + (p - q) * 6.0 * t;
            }
            if t < 0.5 {
                return p;
            }
            if t < 2.0 / 3.0 {
                return q + (p - q) * 6.0 * (2.0 / 3.0 - t);
            }
            q
        };

        Self([
            srgb_to_linear(hue_to_rgb(h + 1.0 / 3.0)),
            srgb_to_linear(hue_to_rgb(h)),
            srgb_to_linear(hue_to_rgb(h - 1.0 / 3.0)),
        ])
    }

    pub fn scaled(self, factor: f32) -> [f32; 3] {
        self.0.map(|c| c * factor)
    }
}

/// Metal/rough surface with an emissive term.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardMaterial {
    pub color: Color,
    pub emissive: Color,
    pub emissive_intensity: f32,
    pub metalness: f32,
    pub roughness: f32,
    pub opacity: f32,
}

impl Default for StandardMaterial {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            emissive: Color::default(),
            emissive_intensity: 1.0,
            metalness: 0.0,
            roughness: 1.0,
            opacity: 1.0,
        }
    }
}

impl StandardMaterial {
    /// Glowing shape tinted and lit in one colour.
    pub fn glowing(color: Color, emissive_intensity: f32, metalness: f32, roughness: f32) -> Self {
        Self {
            color,
            emissive: color,
            emissive_intensity,
            metalness,
            roughness,
            opacity: 1.0,
        }
    }

    pub fn to_uniforms(&self) -> MaterialUniforms {
        MaterialUniforms {
            color: [self.color.0[0], self.color.0[1], self.color.0[2], self.opacity],
            emissive: [
                self.emissive.0[0] * self.emissive_intensity,
                self.emissive.0[1] * self.emissive_intensity,
                self.emissive.0[2] * self.emissive_intensity,
                0.0,
            ],
            params: [self.metalness, self.roughness, 0.0, 0.0],
        }
    }
}

/// GPU layout of a material. 48 bytes.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct MaterialUniforms {
    /// rgb, a = opacity
    pub color: [f32; 4],
    /// rgb already scaled by intensity
    pub emissive: [f32; 4],
    /// metalness, roughness, unused, unused
    pub params: [f32; 4],
}
