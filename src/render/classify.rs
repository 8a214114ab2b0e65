//! Classifies elevations into the colors of the terrain awareness display.
//!
//! Terrain close to or above the aircraft is drawn in the hazard colors, regardless of its
//! elevation band. All other terrain is tinted by its elevation in steps of 1000 ft.

use crate::{
    config::NotFoundStyle,
    math::meters_to_feet,
    terrain_data::{HeightSample, Sentinel},
};
use bevy::math::Vec3;

pub const WATER: Vec3 = Vec3::new(0.0, 0.0, 0.47);
pub const UNKNOWN_TERRAIN: Vec3 = Vec3::new(0.5, 0.0, 0.5);
pub const LOADING: Vec3 = Vec3::ZERO;
pub const HAZARD_HIGH: Vec3 = Vec3::new(0.8, 0.0, 0.0);
pub const HAZARD_CAUTION: Vec3 = Vec3::new(0.8, 0.8, 0.0);
/// The color of terrain below 500 ft.
pub const L500: Vec3 = Vec3::new(0.0, 0.35, 0.0);

/// Terrain within this distance below the aircraft is drawn in [`HAZARD_CAUTION`].
pub const CAUTION_MARGIN_FEET: i32 = 500;
/// Terrain more than this distance above the aircraft is drawn in [`HAZARD_HIGH`].
pub const HIGH_MARGIN_FEET: i32 = 2000;

/// The elevation band colors, indexed by the elevation in thousands of feet.
/// The highest bands share their colors.
pub const BANDS: [Vec3; 20] = [
    Vec3::new(0.05, 0.4, 0.05),
    Vec3::new(0.2, 0.45, 0.1),
    Vec3::new(0.35, 0.5, 0.15),
    Vec3::new(0.5, 0.55, 0.2),
    Vec3::new(0.6, 0.55, 0.25),
    Vec3::new(0.65, 0.5, 0.25),
    Vec3::new(0.65, 0.45, 0.25),
    Vec3::new(0.6, 0.4, 0.22),
    Vec3::new(0.55, 0.35, 0.2),
    Vec3::new(0.5, 0.3, 0.18),
    Vec3::new(0.45, 0.27, 0.16),
    Vec3::new(0.42, 0.3, 0.22),
    Vec3::new(0.45, 0.38, 0.32),
    Vec3::new(0.55, 0.5, 0.45),
    Vec3::new(0.55, 0.5, 0.45),
    Vec3::new(0.7, 0.68, 0.65),
    Vec3::new(0.7, 0.68, 0.65),
    Vec3::new(0.85, 0.85, 0.85),
    Vec3::new(0.85, 0.85, 0.85),
    Vec3::new(0.95, 0.95, 0.95),
];

/// A sample of the terrain, prepared for classification.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Terrain {
    Water,
    NoData,
    NotLoaded,
    /// Land at the elevation in feet.
    Feet(i32),
}

impl Terrain {
    /// Converts a sample, deciding how tiles without data are displayed.
    pub fn from_sample(sample: HeightSample, not_found: NotFoundStyle) -> Self {
        match sample {
            HeightSample::Elevation(elevation) if elevation.water => Terrain::Water,
            HeightSample::Elevation(elevation) => Terrain::Feet(meters_to_feet(elevation.meters)),
            HeightSample::Sentinel(Sentinel::NotLoaded) => Terrain::NotLoaded,
            HeightSample::Sentinel(Sentinel::NoData) => Terrain::NoData,
            HeightSample::Sentinel(Sentinel::NotFound) => match not_found {
                NotFoundStyle::Water => Terrain::Water,
                NotFoundStyle::Unknown => Terrain::NoData,
            },
        }
    }
}

/// The color of the terrain seen from the given altitude in feet.
pub fn classify(terrain: Terrain, altitude: i32) -> Vec3 {
    let feet = match terrain {
        Terrain::Water => return WATER,
        Terrain::NoData => return UNKNOWN_TERRAIN,
        Terrain::NotLoaded => return LOADING,
        Terrain::Feet(feet) => feet,
    };

    if feet - HIGH_MARGIN_FEET > altitude {
        HAZARD_HIGH
    } else if feet > altitude - CAUTION_MARGIN_FEET {
        HAZARD_CAUTION
    } else if feet < 500 {
        L500
    } else {
        BANDS[(feet / 1000).clamp(0, BANDS.len() as i32 - 1) as usize]
    }
}
