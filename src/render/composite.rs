use crate::math::mix;
use anyhow::{ensure, Result};
use bevy::{
    color::{ColorToPacked, LinearRgba, Srgba},
    math::Vec3,
};
use serde::{Deserialize, Serialize};

/// The brightness range the shading factor is mapped onto.
///
/// The floor stays above zero, so terrain in the shadow remains visible.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShadeRange {
    pub floor: f32,
    pub ceiling: f32,
}

impl Default for ShadeRange {
    fn default() -> Self {
        Self {
            floor: 0.4,
            ceiling: 1.0,
        }
    }
}

impl ShadeRange {
    pub fn new(floor: f32, ceiling: f32) -> Self {
        Self { floor, ceiling }
    }

    /// Disables the shading.
    pub fn unshaded() -> Self {
        Self::new(1.0, 1.0)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.floor > 0.0, "the shade floor must be positive");
        ensure!(
            self.floor <= self.ceiling,
            "the shade floor {} exceeds the ceiling {}",
            self.floor,
            self.ceiling
        );

        Ok(())
    }

    #[inline]
    pub fn brightness(&self, shade: f32) -> f32 {
        mix(self.floor, self.ceiling, shade)
    }
}

/// Shades the classified color and applies the 2.2 gamma of the display.
#[inline]
pub fn composite(color: Vec3, shade: f32, range: ShadeRange) -> LinearRgba {
    let shaded = color * range.brightness(shade);
    let encoded = shaded.max(Vec3::ZERO).powf(2.2);

    LinearRgba::rgb(encoded.x, encoded.y, encoded.z)
}

/// Converts the composited color to the 8 bit sRGB pixel of the output image.
#[inline]
pub fn to_srgba8(color: LinearRgba) -> [u8; 4] {
    Srgba::from(color).to_u8_array()
}
