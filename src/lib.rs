//! This crate renders terrain awareness maps, as shown on the navigation displays of aircraft.
//!
//! # Background
//! A terrain awareness map shows the terrain surrounding the aircraft from above, centered on
//! its position and rotated to its heading. Each pixel is colored by the elevation of the
//! terrain below it, and terrain close to or above the altitude of the aircraft is highlighted
//! in warning colors, to draw the attention of the pilot.
//!
//! ## How is the terrain data stored and accessed?
//! The elevation data of the whole earth is split into tiles of 1°×1°, which are streamed in
//! on demand into a shared atlas. The [`TileGridMap`](terrain_data::TileGridMap) locates each
//! tile inside the atlas or marks it as missing or not yet loaded.
//! While rendering, every sampled tile is flagged, so the [`TileAtlas`](terrain_data::TileAtlas)
//! knows which tiles to load next.
//! See the [`terrain_data`] module for more information.
//!
//! ## How is the map rendered?
//! Every pixel is projected onto the spherical earth, sampled, classified against the altitude
//! of the aircraft and shaded by the slope of the terrain, independently of all other pixels.
//! See the [`render`] module for more information.

pub mod config;
pub mod math;
pub mod plugin;
pub mod render;
pub mod terrain_data;

pub mod prelude {
    //! `use bevy_taws::prelude::*;` to import common types.

    pub use crate::{
        config::{FrameConfig, MapConfig, NotFoundStyle, PipelineFlags},
        math::{CameraState, DisplayMode, GeoCoordinate, Range, TileGridCell},
        plugin::{MapImage, TawsPlugin, TerrainAtlas},
        render::{MapRenderer, ShadeRange, Sun, TerrainSampler},
        terrain_data::{
            AtlasFormat, DirectoryTileSource, MemoryTileSource, TileAtlas, TileLoader, TileSource,
            TileUsage,
        },
    };
}
