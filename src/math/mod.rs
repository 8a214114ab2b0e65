//! Geographic math of the map: coordinates on the spherical earth, the 1°×1° tile grid,
//! the inverse azimuthal-equidistant projection and the display ranges.

mod coordinate;
mod projection;
mod range;

pub use crate::math::{
    coordinate::{GeoCoordinate, TileGridCell, TilePosition, GRID_HEIGHT, GRID_WIDTH},
    projection::{project, CameraState},
    range::{DisplayMode, Range},
};

/// The mean radius of the earth in meters, used to convert angular distances to ground distances.
pub const EARTH_RADIUS: f64 = 6_371_000.0;

/// The conversion factor from meters to feet.
pub const FEET_PER_METER: f32 = 3.28084;

/// Linearly interpolates between `a` and `b`.
#[inline]
pub fn mix(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Converts an elevation in meters to whole feet, truncating toward zero.
#[inline]
pub fn meters_to_feet(meters: f32) -> i32 {
    (meters * FEET_PER_METER) as i32
}
