use bevy::math::DVec2;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The count of 1° tile columns around the earth.
pub const GRID_WIDTH: u32 = 360;
/// The count of 1° tile rows from the south to the north pole.
pub const GRID_HEIGHT: u32 = 180;

/// A location on the spherical earth.
///
/// Latitude and longitude are stored in radians; the longitude is periodic and may lie
/// outside of `[-π, π)`, it is only normalized when the tile grid is indexed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    pub lat: f64,
    pub lon: f64,
}

impl GeoCoordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn from_degrees(lat: f64, lon: f64) -> Self {
        Self {
            lat: lat.to_radians(),
            lon: lon.to_radians(),
        }
    }

    pub fn lat_degrees(self) -> f64 {
        self.lat.to_degrees()
    }

    pub fn lon_degrees(self) -> f64 {
        self.lon.to_degrees()
    }

    /// Moves the coordinate by the given offsets in degrees.
    pub fn offset_degrees(self, lat: f64, lon: f64) -> Self {
        Self::from_degrees(self.lat_degrees() + lat, self.lon_degrees() + lon)
    }
}

/// The global identifier of a 1°×1° tile.
///
/// `lon_index` counts eastwards from 180°W and `lat_index` northwards from 90°S,
/// so the cell `(180, 90)` covers the square north-east of the null island.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct TileGridCell {
    pub lon_index: u32,
    pub lat_index: u32,
}

impl TileGridCell {
    pub fn new(lon_index: u32, lat_index: u32) -> Self {
        Self {
            lon_index: lon_index % GRID_WIDTH,
            lat_index: lat_index.min(GRID_HEIGHT - 1),
        }
    }

    /// The cell whose south-west corner lies at the given whole degrees.
    pub fn from_degrees(lat: i16, lon: i16) -> Self {
        Self::new(
            (lon as i32 + 180).rem_euclid(GRID_WIDTH as i32) as u32,
            (lat as i32 + 90).clamp(0, GRID_HEIGHT as i32 - 1) as u32,
        )
    }

    /// The flat index of the cell inside the 360×180 grid, row by row from the south.
    #[inline]
    pub fn index(self) -> usize {
        (self.lat_index * GRID_WIDTH + self.lon_index) as usize
    }

    pub fn from_index(index: usize) -> Self {
        let index = index as u32;
        Self::new(index % GRID_WIDTH, index / GRID_WIDTH)
    }

    /// The latitude and longitude of the south-west corner in whole degrees.
    pub fn south_west(self) -> (i16, i16) {
        (
            self.lat_index as i16 - 90,
            self.lon_index as i16 - 180,
        )
    }

    pub fn iter_all() -> impl Iterator<Item = Self> {
        (0..(GRID_WIDTH * GRID_HEIGHT) as usize).map(Self::from_index)
    }
}

impl fmt::Display for TileGridCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let (lat, lon) = self.south_west();

        write!(
            f,
            "{}{:02}{}{:03}",
            if lat < 0 { 'S' } else { 'N' },
            lat.abs(),
            if lon < 0 { 'W' } else { 'E' },
            lon.abs()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTileGridCellError;

impl fmt::Display for ParseTileGridCellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("expected a tile name like N47E011")
    }
}

impl std::error::Error for ParseTileGridCellError {}

impl FromStr for TileGridCell {
    type Err = ParseTileGridCellError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let split = s.find(['E', 'W']).ok_or(ParseTileGridCellError)?;
        let (lat, lon) = s.split_at(split);

        let parse = |part: &str, positive: char, negative: char| {
            let mut chars = part.chars();
            let sign = match chars.next() {
                Some(c) if c == positive => 1,
                Some(c) if c == negative => -1,
                _ => return Err(ParseTileGridCellError),
            };
            let value: i16 = chars.as_str().parse().map_err(|_| ParseTileGridCellError)?;
            Ok(sign * value)
        };

        let lat = parse(lat, 'N', 'S')?;
        let lon = parse(lon, 'E', 'W')?;

        if !(-90..90).contains(&lat) || !(-180..180).contains(&lon) {
            return Err(ParseTileGridCellError);
        }

        Ok(Self::from_degrees(lat, lon))
    }
}

/// A geographic coordinate resolved onto the tile grid.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TilePosition {
    pub cell: TileGridCell,
    /// The position inside the tile, `x` eastwards and `y` southwards, both in `[0, 1]`.
    /// The vertical flip matches the tile images, which store their northern row first.
    pub uv: DVec2,
}

impl TilePosition {
    /// Resolves the tile grid cell containing the coordinate.
    ///
    /// The longitude wraps every 360°, the latitude is clamped to the grid, so the poles
    /// fall into the outermost rows.
    pub fn locate(coordinate: GeoCoordinate) -> Self {
        let lat = coordinate.lat_degrees() + 90.0;
        let lon = (coordinate.lon_degrees() + 180.0).rem_euclid(360.0);

        let lat_index = (lat.floor() as i64).clamp(0, GRID_HEIGHT as i64 - 1);
        let mut lon_index = lon.floor() as i64;
        let mut lon_fraction = lon - lon_index as f64;

        // rem_euclid may round tiny negative longitudes up to exactly 360
        if lon_index >= GRID_WIDTH as i64 {
            lon_index = 0;
            lon_fraction = 0.0;
        }

        let lat_fraction = (lat - lat_index as f64).clamp(0.0, 1.0);

        Self {
            cell: TileGridCell {
                lon_index: lon_index as u32,
                lat_index: lat_index as u32,
            },
            uv: DVec2::new(lon_fraction, 1.0 - lat_fraction),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn cell_index_round_trip() {
        for index in [0, 359, 360, 180 * 360 - 1, 90 * 360 + 180] {
            assert_eq!(TileGridCell::from_index(index).index(), index);
        }
    }

    #[test]
    fn cell_names() {
        let cell = TileGridCell::from_degrees(47, 11);
        assert_eq!(cell.to_string(), "N47E011");
        assert_eq!("N47E011".parse::<TileGridCell>(), Ok(cell));

        let cell = TileGridCell::from_degrees(-34, -71);
        assert_eq!(cell.to_string(), "S34W071");
        assert_eq!("S34W071".parse::<TileGridCell>(), Ok(cell));

        assert!("X12E011".parse::<TileGridCell>().is_err());
        assert!("N95E011".parse::<TileGridCell>().is_err());
    }

    #[test]
    fn locate_null_island() {
        let position = TilePosition::locate(GeoCoordinate::from_degrees(0.25, 0.75));

        assert_eq!(position.cell, TileGridCell::new(180, 90));
        assert!((position.uv.x - 0.75).abs() < 1e-9);
        assert!((position.uv.y - 0.75).abs() < 1e-9);
    }

    #[test]
    fn locate_negative_coordinates() {
        let position = TilePosition::locate(GeoCoordinate::from_degrees(-33.5, -70.25));

        assert_eq!(position.cell, TileGridCell::from_degrees(-34, -71));
        assert!((position.uv.x - 0.75).abs() < 1e-9);
        assert!((position.uv.y - 0.5).abs() < 1e-9);
    }

    #[test]
    fn locate_wraps_longitude() {
        let mut rng = rand::rng();

        for _ in 0..10_000 {
            let lat = rng.random_range(-89.9..89.9);
            let lon = rng.random_range(-720.0..720.0);

            let a = TilePosition::locate(GeoCoordinate::from_degrees(lat, lon));
            let b = TilePosition::locate(GeoCoordinate::from_degrees(lat, lon + 360.0));

            assert_eq!(a.cell, b.cell, "lat {lat} lon {lon}");
        }
    }

    #[test]
    fn locate_clamps_poles() {
        let north = TilePosition::locate(GeoCoordinate::from_degrees(90.0, 10.0));
        let south = TilePosition::locate(GeoCoordinate::from_degrees(-90.0, 10.0));

        assert_eq!(north.cell.lat_index, GRID_HEIGHT - 1);
        assert_eq!(south.cell.lat_index, 0);
        assert!((0.0..=1.0).contains(&north.uv.y));
    }
}
