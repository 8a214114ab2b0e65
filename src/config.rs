use crate::{
    math::{CameraState, DisplayMode, GeoCoordinate, Range},
    render::{ShadeRange, Sun},
    terrain_data::AtlasFormat,
};
use anyhow::{ensure, Result};
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

bitflags::bitflags! {
    /// Selects the optional stages of the map pipeline.
    #[repr(transparent)]
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct PipelineFlags: u32 {
        /// Rotates the map, so the heading points to the top edge.
        const HEADING_UP = 1 << 0;
        /// Blends the four texels around each sample instead of using the nearest one.
        const BILINEAR   = 1 << 1;
        /// Shades the terrain relief.
        const HILLSHADE  = 1 << 2;
        /// Stores the water flag in the atlas samples.
        const WATER_MASK = 1 << 3;
    }
}

impl Default for PipelineFlags {
    fn default() -> Self {
        Self::all()
    }
}

/// How cells without any elevation data are displayed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotFoundStyle {
    /// Most cells without data are oceans.
    #[default]
    Water,
    Unknown,
}

/// The persistent configuration of the map.
#[derive(Clone, Debug, PartialEq, Resource, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub flags: PipelineFlags,
    pub not_found: NotFoundStyle,
    /// The shading range of the final output.
    pub shade: ShadeRange,
    /// The count of samples along the edge of a tile.
    pub tile_size: u32,
    pub sun: Sun,
    pub display_mode: DisplayMode,
    /// The largest range the atlas has to hold the tiles for.
    pub max_range: Range,
    /// The highest latitude in degrees, north or south, the atlas has to hold the tiles for.
    pub max_latitude: f64,
    /// The count of tiles loaded at once.
    pub max_loading_tiles: usize,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            flags: PipelineFlags::default(),
            not_found: NotFoundStyle::default(),
            shade: ShadeRange::default(),
            tile_size: 256,
            sun: Sun::default(),
            display_mode: DisplayMode::default(),
            max_range: Range::Nm80,
            max_latitude: 70.0,
            max_loading_tiles: 8,
        }
    }
}

impl MapConfig {
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let encoded = fs::read_to_string(path)?;
        let config: Self = ron::from_str(&encoded)?;

        config.validate()?;
        Ok(config)
    }

    pub fn save_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let encoded = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;

        fs::write(path, encoded)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.tile_size > 0, "the tile size must not be zero");
        ensure!(
            (0.0..=90.0).contains(&self.max_latitude),
            "the maximum latitude {} is outside of [0, 90]",
            self.max_latitude
        );
        self.shade.validate()?;

        Ok(())
    }

    pub fn atlas_format(&self) -> AtlasFormat {
        if self.flags.contains(PipelineFlags::WATER_MASK) {
            AtlasFormat::Packed
        } else {
            AtlasFormat::Raw
        }
    }

    /// The count of tiles the atlas has room for.
    pub fn atlas_capacity(&self) -> usize {
        crate::terrain_data::TileAtlas::capacity_for(
            self.max_range,
            self.display_mode,
            self.max_latitude,
        )
    }
}

/// The read-only state of a single frame.
#[derive(Clone, Copy, Debug, PartialEq, Resource, Serialize, Deserialize)]
pub struct FrameConfig {
    pub camera: CameraState,
    pub sun: Sun,
    /// The size of the output image in pixels.
    pub resolution: UVec2,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self::for_range(
            GeoCoordinate::default(),
            0.0,
            0.0,
            Range::default(),
            DisplayMode::default(),
            512,
        )
    }
}

impl FrameConfig {
    /// Builds the frame for a display range, `height` is the output height in pixels.
    pub fn for_range(
        map_center: GeoCoordinate,
        heading: f64,
        altitude: f32,
        range: Range,
        mode: DisplayMode,
        height: u32,
    ) -> Self {
        let aspect_ratio = mode.aspect_ratio();
        let width = (height as f64 * aspect_ratio).round().max(1.0) as u32;

        Self {
            camera: CameraState {
                map_center,
                vertical_diameter: range.vertical_degrees(),
                aspect_ratio,
                heading,
                altitude,
            },
            sun: Sun::default(),
            resolution: UVec2::new(width, height.max(1)),
        }
    }

    /// The camera used for rendering, rotated to north-up unless the flags ask otherwise.
    pub fn camera(&self, flags: PipelineFlags) -> CameraState {
        if flags.contains(PipelineFlags::HEADING_UP) {
            self.camera
        } else {
            self.camera.north_up()
        }
    }

    /// The ground distance between two output pixels in meters.
    pub fn meters_per_pixel(&self) -> f32 {
        self.camera.meters_per_pixel(self.resolution.y) as f32
    }

    /// The aircraft altitude in whole feet.
    pub fn altitude_feet(&self) -> i32 {
        self.camera.altitude as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MapConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.atlas_format(), AtlasFormat::Packed);
        assert_eq!(config.not_found, NotFoundStyle::Water);
    }

    #[test]
    fn reject_invalid_configs() {
        let config = MapConfig {
            tile_size: 0,
            ..default()
        };
        assert!(config.validate().is_err());

        let config = MapConfig {
            shade: ShadeRange::new(0.0, 1.0),
            ..default()
        };
        assert!(config.validate().is_err());

        let config = MapConfig {
            shade: ShadeRange::new(0.8, 0.5),
            ..default()
        };
        assert!(config.validate().is_err());

        let config = MapConfig {
            max_latitude: 95.0,
            ..default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_file() {
        let path = std::env::temp_dir().join(format!("bevy_taws_config_{}.ron", std::process::id()));

        let config = MapConfig {
            flags: PipelineFlags::HILLSHADE | PipelineFlags::BILINEAR,
            not_found: NotFoundStyle::Unknown,
            tile_size: 128,
            ..default()
        };

        config.save_file(&path).unwrap();
        let loaded = MapConfig::load_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded, config);
        assert_eq!(loaded.atlas_format(), AtlasFormat::Raw);
    }

    #[test]
    fn partial_config_file() {
        let config: MapConfig = ron::from_str("(tile_size: 64, not_found: Unknown)").unwrap();

        assert_eq!(config.tile_size, 64);
        assert_eq!(config.not_found, NotFoundStyle::Unknown);
        assert_eq!(config.shade, ShadeRange::default());
    }

    #[test]
    fn frame_for_range() {
        let frame = FrameConfig::for_range(
            GeoCoordinate::from_degrees(47.0, 11.0),
            1.0,
            9000.0,
            Range::Nm20,
            DisplayMode::FullPage,
            500,
        );

        assert_eq!(frame.resolution, UVec2::new(712, 500));
        assert_eq!(frame.camera.vertical_diameter, Range::Nm20.vertical_degrees());
        assert_eq!(frame.camera(PipelineFlags::empty()).heading, 0.0);
        assert_eq!(frame.camera(PipelineFlags::HEADING_UP).heading, 1.0);
        assert_eq!(frame.altitude_feet(), 9000);
    }
}
