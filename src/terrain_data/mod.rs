//! This module contains the data the map is rendered from: the shared
//! [`ElevationAtlas`], the [`TileGridMap`] that locates each 1°×1° tile inside of it,
//! and the [`TileUsage`] signals, which tell the tile manager which tiles were needed.
//!
//! # Explanation
//! Elevation tiles cover one degree of latitude and longitude each and are stored as
//! square images of `tile_size`×`tile_size` samples, northern row first.
//! The [`TileAtlas`] packs the currently resident tiles into one large atlas and publishes
//! their pixel offsets in the tile grid map.
//! Tiles that are not resident are published as one of two sentinel offsets:
//! *not-found* (there is no data for this cell) and *not-loaded* (the data exists, but has
//! not been streamed in yet).
//!
//! While rendering, every sampled cell is flagged in the [`TileUsage`] signals.
//! After the frame the tile atlas turns these signals into load requests for the
//! [`TileLoader`], which streams the tiles in from a [`TileSource`].

use derive_more::derive::{Display, From};
use serde::{Deserialize, Serialize};

mod atlas;
mod tile_atlas;
mod tile_grid;
mod tile_loader;

pub use crate::terrain_data::{
    atlas::ElevationAtlas,
    tile_atlas::TileAtlas,
    tile_grid::{visible_cells, AtlasLookup, AtlasOffset, TileGridMap, TileUsage},
    tile_loader::{DirectoryTileSource, MemoryTileSource, TileLoader, TileSource},
};

/// The raw elevation of water surfaces in tiles, in meters.
pub const WATER_ELEVATION: i16 = -500;
/// The raw elevation of samples without data, in meters.
pub const NO_DATA_ELEVATION: i16 = i16::MIN;
/// The offset added to elevations in meters, to keep packed magnitudes non-negative.
pub const ELEVATION_OFFSET: i32 = 500;

/// The storage format of the elevation atlas.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AtlasFormat {
    /// 16 bit samples, bit 15 flags water, bits 0-14 store the offset elevation.
    #[default]
    Packed,
    /// Signed 16 bit elevations in meters, with out-of-band water and no-data values.
    Raw,
}

/// A valid elevation sample.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Elevation {
    /// The elevation above mean sea level in meters.
    pub meters: f32,
    pub water: bool,
}

impl Elevation {
    pub fn land(meters: f32) -> Self {
        Self {
            meters,
            water: false,
        }
    }

    pub fn water() -> Self {
        Self {
            meters: 0.0,
            water: true,
        }
    }
}

/// A sample that carries no elevation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display)]
pub enum Sentinel {
    /// No data exists for the tile.
    #[display("not found")]
    NotFound,
    /// The tile exists, but is not resident in the atlas yet.
    #[display("not loaded")]
    NotLoaded,
    /// The tile is resident, but the sample itself has no data.
    #[display("no data")]
    NoData,
}

impl Sentinel {
    /// Combines the sentinels of multiple samples, the most transient state wins.
    pub fn dominant(self, other: Self) -> Self {
        match (self, other) {
            (Sentinel::NotLoaded, _) | (_, Sentinel::NotLoaded) => Sentinel::NotLoaded,
            (Sentinel::NotFound, _) | (_, Sentinel::NotFound) => Sentinel::NotFound,
            _ => Sentinel::NoData,
        }
    }
}

/// The result of sampling the elevation at a location.
#[derive(Copy, Clone, Debug, PartialEq, From)]
pub enum HeightSample {
    Elevation(Elevation),
    Sentinel(Sentinel),
}

impl HeightSample {
    pub fn elevation(self) -> Option<Elevation> {
        match self {
            HeightSample::Elevation(elevation) => Some(elevation),
            HeightSample::Sentinel(_) => None,
        }
    }

    /// Decodes a sample of a [`AtlasFormat::Raw`] atlas.
    pub fn from_raw(value: i16) -> Self {
        match value {
            NO_DATA_ELEVATION => Sentinel::NoData.into(),
            WATER_ELEVATION => Elevation::water().into(),
            meters => Elevation::land(meters as f32).into(),
        }
    }
}

/// An elevation packed into 16 bits: bit 15 flags water and bits 0-14 store the
/// elevation in meters plus [`ELEVATION_OFFSET`].
///
/// The two largest magnitudes are reserved for samples without elevation.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PackedElevation(pub u16);

impl PackedElevation {
    pub const WATER_BIT: u16 = 1 << 15;
    pub const MAGNITUDE_MASK: u16 = !Self::WATER_BIT;
    pub const NOT_LOADED: Self = Self(0x7FFF);
    pub const NO_DATA: Self = Self(0x7FFE);
    const MAX_MAGNITUDE: i32 = 0x7FFD;

    /// Packs a raw tile sample, converting the water elevation into the water bit.
    pub fn from_raw(value: i16) -> Self {
        match HeightSample::from_raw(value) {
            HeightSample::Elevation(elevation) => Self::from_elevation(elevation),
            HeightSample::Sentinel(sentinel) => Self::from_sentinel(sentinel),
        }
    }

    pub fn from_elevation(elevation: Elevation) -> Self {
        let magnitude =
            (elevation.meters.round() as i32 + ELEVATION_OFFSET).clamp(0, Self::MAX_MAGNITUDE);
        let water = if elevation.water { Self::WATER_BIT } else { 0 };

        Self(magnitude as u16 | water)
    }

    /// Packs a sentinel, `NotFound` tiles are stored as [`Self::NO_DATA`].
    pub fn from_sentinel(sentinel: Sentinel) -> Self {
        match sentinel {
            Sentinel::NotLoaded => Self::NOT_LOADED,
            Sentinel::NotFound | Sentinel::NoData => Self::NO_DATA,
        }
    }

    pub fn is_water(self) -> bool {
        self.0 & Self::WATER_BIT != 0
    }

    pub fn magnitude(self) -> u16 {
        self.0 & Self::MAGNITUDE_MASK
    }

    pub fn unpack(self) -> HeightSample {
        match self {
            Self::NOT_LOADED => Sentinel::NotLoaded.into(),
            Self::NO_DATA => Sentinel::NoData.into(),
            _ => Elevation {
                meters: (self.magnitude() as i32 - ELEVATION_OFFSET) as f32,
                water: self.is_water(),
            }
            .into(),
        }
    }
}

impl From<HeightSample> for PackedElevation {
    fn from(sample: HeightSample) -> Self {
        match sample {
            HeightSample::Elevation(elevation) => Self::from_elevation(elevation),
            HeightSample::Sentinel(sentinel) => Self::from_sentinel(sentinel),
        }
    }
}
