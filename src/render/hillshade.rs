use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI, TAU};

/// The direction of the light illuminating the terrain.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sun {
    /// The angle from the zenith in radians.
    pub zenith: f32,
    /// The compass direction in radians, clockwise from north.
    pub azimuth: f32,
}

impl Default for Sun {
    fn default() -> Self {
        Self {
            zenith: 45f32.to_radians(),
            azimuth: 315f32.to_radians(),
        }
    }
}

/// The rate of change of the elevation in meters per meter.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Gradient {
    pub dzdx: f32,
    pub dzdy: f32,
}

impl Gradient {
    pub fn new(dzdx: f32, dzdy: f32) -> Self {
        Self { dzdx, dzdy }
    }

    /// Applies the Sobel operator to a 3×3 neighbourhood of elevations in meters.
    ///
    /// The rows are ordered from the top to the bottom of the map and the columns from left
    /// to right. `meters_per_pixel` is the ground distance between neighbouring samples.
    pub fn sobel(samples: &[[f32; 3]; 3], meters_per_pixel: f32) -> Self {
        let [[a, b, c], [d, _, f], [g, h, i]] = *samples;
        let scale = 8.0 * meters_per_pixel;

        Self {
            dzdx: ((c + 2.0 * f + i) - (a + 2.0 * d + g)) / scale,
            dzdy: ((g + 2.0 * h + i) - (a + 2.0 * b + c)) / scale,
        }
    }

    /// The steepness of the terrain in radians.
    pub fn slope(self) -> f32 {
        (self.dzdx * self.dzdx + self.dzdy * self.dzdy).sqrt().atan()
    }

    /// The direction the terrain faces in radians, within `[0, 2π)`.
    pub fn aspect(self) -> f32 {
        if self.dzdx != 0.0 {
            let aspect = self.dzdy.atan2(-self.dzdx);
            if aspect < 0.0 {
                aspect + TAU
            } else {
                aspect
            }
        } else if self.dzdy > 0.0 {
            FRAC_PI_2
        } else if self.dzdy < 0.0 {
            PI + FRAC_PI_2
        } else {
            0.0
        }
    }
}

/// Computes the illumination of the terrain, within `[0, 1]`.
pub fn shade(gradient: Gradient, sun: Sun) -> f32 {
    let slope = gradient.slope();
    let aspect = gradient.aspect();

    let factor = sun.zenith.cos() * slope.cos()
        + sun.zenith.sin() * slope.sin() * (sun.azimuth - aspect).cos();

    // NaN inputs fall back to the darkest shade
    if factor.is_nan() {
        0.0
    } else {
        factor.clamp(0.0, 1.0)
    }
}
