use crate::{
    math::{mix, GeoCoordinate, TilePosition},
    terrain_data::{
        AtlasLookup, Elevation, ElevationAtlas, HeightSample, Sentinel, TileAtlas, TileGridMap,
        TileUsage,
    },
};
use bevy::math::{DVec2, UVec2, Vec2};

/// Resolves geographic coordinates to elevation samples of the atlas.
///
/// Every coordinate is located on the tile grid first, which flags its cell as used, even if
/// the tile turns out to be missing. Sentinel offsets are handled before the atlas is read.
#[derive(Clone, Copy)]
pub struct TerrainSampler<'a> {
    grid: &'a TileGridMap,
    atlas: &'a ElevationAtlas,
    usage: &'a TileUsage,
    tile_size: u32,
}

impl<'a> TerrainSampler<'a> {
    pub fn new(
        grid: &'a TileGridMap,
        atlas: &'a ElevationAtlas,
        usage: &'a TileUsage,
        tile_size: u32,
    ) -> Self {
        Self {
            grid,
            atlas,
            usage,
            tile_size,
        }
    }

    pub fn from_tile_atlas(tile_atlas: &'a TileAtlas, usage: &'a TileUsage) -> Self {
        Self::new(
            tile_atlas.grid(),
            tile_atlas.atlas(),
            usage,
            tile_atlas.tile_size(),
        )
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Resolves the tile containing the coordinate and flags it as used.
    #[inline]
    pub fn locate(&self, coordinate: GeoCoordinate) -> (TilePosition, AtlasLookup) {
        let position = TilePosition::locate(coordinate);
        self.usage.mark_used(position.cell);

        (position, self.grid.lookup(position.cell))
    }

    /// Samples the texel containing the coordinate.
    #[inline]
    pub fn sample(&self, coordinate: GeoCoordinate) -> HeightSample {
        let (position, lookup) = self.locate(coordinate);

        match lookup {
            AtlasLookup::NotFound => Sentinel::NotFound.into(),
            AtlasLookup::NotLoaded => Sentinel::NotLoaded.into(),
            AtlasLookup::Resident(offset) => self.atlas.texel(offset + self.texel(position.uv)),
        }
    }

    /// Blends the four texels around the coordinate.
    ///
    /// Each corner is located separately, since the neighbouring texels may lie in different
    /// tiles. If any corner is a sentinel, the most transient one is returned instead.
    pub fn sample_bilinear(&self, coordinate: GeoCoordinate) -> HeightSample {
        let delta = 1.0 / self.tile_size as f64;

        let corners = [
            coordinate,
            coordinate.offset_degrees(0.0, delta),
            coordinate.offset_degrees(-delta, 0.0),
            coordinate.offset_degrees(-delta, delta),
        ]
        .map(|corner| self.sample(corner));

        let mut elevations = [Elevation::default(); 4];
        let mut sentinel = None::<Sentinel>;

        for (elevation, corner) in elevations.iter_mut().zip(corners) {
            match corner {
                HeightSample::Elevation(value) => *elevation = value,
                HeightSample::Sentinel(value) => {
                    sentinel = Some(sentinel.map_or(value, |other| other.dominant(value)));
                }
            }
        }

        if let Some(sentinel) = sentinel {
            return sentinel.into();
        }

        let weight = self.texel_fraction(TilePosition::locate(coordinate).uv);
        let [north_west, north_east, south_west, south_east] = elevations;

        let blend = |value: fn(&Elevation) -> f32| {
            let north = mix(value(&north_west), value(&north_east), weight.x);
            let south = mix(value(&south_west), value(&south_east), weight.x);
            mix(north, south, weight.y)
        };

        let meters = blend(|elevation| elevation.meters);
        let water = blend(|elevation| elevation.water as u8 as f32);

        Elevation {
            meters,
            water: water >= 0.5,
        }
        .into()
    }

    #[inline]
    fn texel(&self, uv: DVec2) -> UVec2 {
        (uv * self.tile_size as f64)
            .as_uvec2()
            .min(UVec2::splat(self.tile_size - 1))
    }

    fn texel_fraction(&self, uv: DVec2) -> Vec2 {
        let position = uv * self.tile_size as f64;
        (position - position.floor()).as_vec2()
    }
}
