use crate::math::{project, CameraState, TileGridCell, TilePosition, GRID_HEIGHT, GRID_WIDTH};
use bevy::{
    math::{DVec2, UVec2},
    utils::HashSet,
};
use bytemuck::{Pod, Zeroable};
use itertools::{iproduct, Itertools};
use ndarray::Array2;
use std::sync::atomic::{AtomicBool, Ordering};

/// The pixel offset of a tile inside the elevation atlas.
///
/// Two values are reserved: an `x` equal to the atlas width marks a tile without data
/// and a `y` equal to the atlas height marks a tile that is not resident yet.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct AtlasOffset {
    pub x: u32,
    pub y: u32,
}

impl AtlasOffset {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl From<UVec2> for AtlasOffset {
    fn from(value: UVec2) -> Self {
        Self::new(value.x, value.y)
    }
}

/// The classified result of looking up a tile in the [`TileGridMap`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AtlasLookup {
    NotFound,
    NotLoaded,
    Resident(UVec2),
}

/// Maps each 1°×1° cell of the world to the offset of its tile inside the elevation atlas.
pub struct TileGridMap {
    offsets: Array2<AtlasOffset>,
    atlas_size: UVec2,
}

impl TileGridMap {
    /// Creates a map, in which no cell has any data.
    pub fn new(atlas_size: UVec2) -> Self {
        let not_found = AtlasOffset::new(atlas_size.x, atlas_size.y);

        Self {
            offsets: Array2::from_elem((GRID_HEIGHT as usize, GRID_WIDTH as usize), not_found),
            atlas_size,
        }
    }

    pub fn atlas_size(&self) -> UVec2 {
        self.atlas_size
    }

    #[inline]
    pub fn get(&self, cell: TileGridCell) -> AtlasOffset {
        self.offsets[[cell.lat_index as usize, cell.lon_index as usize]]
    }

    /// Looks up the cell and classifies its offset.
    /// The not-found sentinel takes precedence over the not-loaded one.
    #[inline]
    pub fn lookup(&self, cell: TileGridCell) -> AtlasLookup {
        let offset = self.get(cell);

        if offset.x == self.atlas_size.x {
            AtlasLookup::NotFound
        } else if offset.y == self.atlas_size.y {
            AtlasLookup::NotLoaded
        } else {
            AtlasLookup::Resident(UVec2::new(offset.x, offset.y))
        }
    }

    pub fn set_resident(&mut self, cell: TileGridCell, offset: UVec2) {
        debug_assert!(offset.x < self.atlas_size.x && offset.y < self.atlas_size.y);
        self.set(cell, offset.into());
    }

    pub fn set_not_loaded(&mut self, cell: TileGridCell) {
        self.set(cell, AtlasOffset::new(0, self.atlas_size.y));
    }

    pub fn set_not_found(&mut self, cell: TileGridCell) {
        self.set(cell, AtlasOffset::new(self.atlas_size.x, self.atlas_size.y));
    }

    fn set(&mut self, cell: TileGridCell, offset: AtlasOffset) {
        self.offsets[[cell.lat_index as usize, cell.lon_index as usize]] = offset;
    }

    /// The offsets as a 360×180 two channel 32 bit image, row by row from the south.
    pub fn as_bytes(&self) -> &[u8] {
        self.offsets
            .as_slice()
            .map(bytemuck::cast_slice::<_, u8>)
            .unwrap_or_default()
    }
}

/// One flag per tile grid cell, set whenever the renderer sampled the cell.
///
/// Rendering sets flags from many threads at once. Since every write stores the same
/// value the result does not depend on the order of the writes.
pub struct TileUsage {
    used: Box<[AtomicBool]>,
}

impl Default for TileUsage {
    fn default() -> Self {
        Self {
            used: (0..GRID_WIDTH * GRID_HEIGHT)
                .map(|_| AtomicBool::new(false))
                .collect(),
        }
    }
}

impl TileUsage {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn mark_used(&self, cell: TileGridCell) {
        self.used[cell.index()].store(true, Ordering::Relaxed);
    }

    pub fn is_used(&self, cell: TileGridCell) -> bool {
        self.used[cell.index()].load(Ordering::Relaxed)
    }

    /// Resets all flags, called by the tile manager before each frame.
    pub fn clear(&mut self) {
        for flag in self.used.iter_mut() {
            *flag.get_mut() = false;
        }
    }

    pub fn used_cells(&self) -> impl Iterator<Item = TileGridCell> + '_ {
        self.used
            .iter()
            .positions(|flag| flag.load(Ordering::Relaxed))
            .map(TileGridCell::from_index)
    }

    pub fn used_count(&self) -> usize {
        self.used_cells().count()
    }
}

/// The slack in degrees around the cells between two neighbouring screen samples, since the
/// screen edges bend slightly on the sphere.
const EDGE_MARGIN: f64 = 0.05;

/// Collects the cells the renderer samples for the camera, to load them before they are needed.
///
/// The screen is sampled on a grid finer than one tile and every cell between neighbouring
/// samples is collected, so the cells are found regardless of heading or latitude.
/// The sampled area reaches one and a half pixels beyond the image of `resolution` pixels,
/// where the hillshade reads its neighbours, and the cells reach one texel further east and
/// south, where bilinear sampling reads its corners.
pub fn visible_cells(
    camera: &CameraState,
    resolution: UVec2,
    tile_size: u32,
) -> Vec<TileGridCell> {
    let padding = DVec2::splat(1.5) / resolution.max(UVec2::ONE).as_dvec2();
    let scale = DVec2::ONE + 2.0 * padding;
    let texel = 1.0 / tile_size.max(1) as f64;

    // at most half a degree between neighbouring samples
    let extent = DVec2::new(
        camera.vertical_diameter * camera.aspect_ratio,
        camera.vertical_diameter,
    ) * scale;
    let steps = (2.0 * extent).ceil().max(DVec2::ONE).as_uvec2() + 1;

    let samples = Array2::from_shape_fn(
        (steps.y as usize + 1, steps.x as usize + 1),
        |(y, x)| {
            let t = DVec2::new(x as f64 / steps.x as f64, y as f64 / steps.y as f64);
            let coordinate = project(t * scale - padding, camera);

            DVec2::new(coordinate.lon_degrees(), coordinate.lat_degrees())
        },
    );

    let mut cells = HashSet::default();

    for (y, x) in iproduct!(0..steps.y as usize, 0..steps.x as usize) {
        let corners = [
            samples[[y, x]],
            samples[[y, x + 1]],
            samples[[y + 1, x]],
            samples[[y + 1, x + 1]],
        ];

        insert_cells_between(&mut cells, corners, texel);
    }

    cells.into_iter().sorted().collect_vec()
}

/// Inserts the cells spanned by four neighbouring screen samples, given as longitude and
/// latitude in degrees.
fn insert_cells_between(cells: &mut HashSet<TileGridCell>, corners: [DVec2; 4], texel: f64) {
    let reference = corners[0].x;

    // unwrap the longitudes across the antimeridian
    let lons = corners
        .map(|corner| reference + (corner.x - reference + 180.0).rem_euclid(360.0) - 180.0);
    let lats = corners.map(|corner| corner.y);

    let min = |values: [f64; 4]| values.into_iter().fold(f64::INFINITY, f64::min);
    let max = |values: [f64; 4]| values.into_iter().fold(f64::NEG_INFINITY, f64::max);

    let (south, north) = (min(lats), max(lats));
    let (west, east) = (min(lons), max(lons));

    let highest = south.abs().max(north.abs()).min(90.0);
    let lon_margin = (EDGE_MARGIN / highest.to_radians().cos()).min(180.0);

    let rows = (south - EDGE_MARGIN - texel).floor().max(-90.0) as i32
        ..=(north + EDGE_MARGIN).floor().min(89.0) as i32;

    // close to a pole the samples may surround it
    let columns = if east - west + 2.0 * lon_margin >= 180.0 {
        -180..=179
    } else {
        (west - lon_margin).floor() as i32..=(east + lon_margin + texel).floor() as i32
    };

    for (lat, lon) in iproduct!(rows, columns) {
        cells.insert(TileGridCell::from_degrees(lat as i16, lon as i16));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::GeoCoordinate;

    #[test]
    fn sentinel_offsets_are_bit_exact() {
        let mut map = TileGridMap::new(UVec2::new(1024, 512));
        let cell = TileGridCell::from_degrees(47, 11);

        assert_eq!(map.get(cell), AtlasOffset::new(1024, 512));
        assert_eq!(map.lookup(cell), AtlasLookup::NotFound);

        map.set_not_loaded(cell);
        assert_eq!(map.get(cell).y, 512);
        assert_eq!(map.lookup(cell), AtlasLookup::NotLoaded);

        map.set_resident(cell, UVec2::new(256, 0));
        assert_eq!(map.lookup(cell), AtlasLookup::Resident(UVec2::new(256, 0)));

        map.set_not_found(cell);
        assert_eq!(map.lookup(cell), AtlasLookup::NotFound);
    }

    #[test]
    fn grid_map_bytes() {
        let map = TileGridMap::new(UVec2::new(7, 9));
        let bytes = map.as_bytes();

        assert_eq!(bytes.len(), 360 * 180 * 8);
        assert_eq!(&bytes[0..8], &[7, 0, 0, 0, 9, 0, 0, 0]);
    }

    #[test]
    fn usage_flags() {
        let mut usage = TileUsage::new();
        let a = TileGridCell::from_degrees(47, 11);
        let b = TileGridCell::from_degrees(-10, -170);

        usage.mark_used(a);
        usage.mark_used(a);
        usage.mark_used(b);

        assert!(usage.is_used(a));
        assert_eq!(usage.used_count(), 2);
        assert_eq!(usage.used_cells().collect_vec(), vec![b, a]);

        usage.clear();
        assert_eq!(usage.used_count(), 0);
    }

    #[test]
    fn visible_cells_cover_the_view() {
        let camera = CameraState {
            map_center: GeoCoordinate::from_degrees(47.5, 11.5),
            vertical_diameter: 1.5,
            ..Default::default()
        };

        let cells = visible_cells(&camera, UVec2::new(64, 64), 256);

        assert!(cells.contains(&TileGridCell::from_degrees(47, 11)));
        assert!(cells.contains(&TileGridCell::from_degrees(46, 10)));
        assert!(cells.contains(&TileGridCell::from_degrees(48, 12)));
        assert!(!cells.contains(&TileGridCell::from_degrees(50, 11)));
    }

    #[test]
    fn visible_cells_wrap_the_antimeridian() {
        let camera = CameraState {
            map_center: GeoCoordinate::from_degrees(0.5, 179.9),
            vertical_diameter: 1.0,
            ..Default::default()
        };

        let cells = visible_cells(&camera, UVec2::new(64, 64), 256);

        assert!(cells.contains(&TileGridCell::from_degrees(0, 179)));
        assert!(cells.contains(&TileGridCell::from_degrees(0, -180)));
    }

    fn assert_pixels_are_covered(camera: CameraState, resolution: UVec2, tile_size: u32) {
        let cells: HashSet<TileGridCell> = visible_cells(&camera, resolution, tile_size)
            .into_iter()
            .collect();
        let texel = 1.0 / tile_size as f64;

        // every pixel center including a border of one pixel, with its bilinear corners
        for (x, y) in iproduct!(-1..=resolution.x as i32, -1..=resolution.y as i32) {
            let uv = (DVec2::new(x as f64, y as f64) + 0.5) / resolution.as_dvec2();
            let coordinate = project(uv, &camera);

            for corner in [
                coordinate,
                coordinate.offset_degrees(0.0, texel),
                coordinate.offset_degrees(-texel, 0.0),
                coordinate.offset_degrees(-texel, texel),
            ] {
                let cell = TilePosition::locate(corner).cell;
                assert!(cells.contains(&cell), "pixel ({x}, {y}) lies in {cell}");
            }
        }
    }

    #[test]
    fn visible_cells_at_high_latitudes() {
        for (lat, heading, vertical_diameter) in [
            (78.5, 0.0, 1.482),
            (78.5, 0.8, 1.482),
            (-70.0, 2.0, 5.929),
            (84.0, 0.3, 12.19),
        ] {
            let camera = CameraState {
                map_center: GeoCoordinate::from_degrees(lat, 15.5),
                vertical_diameter,
                aspect_ratio: 1.423,
                heading,
                altitude: 0.0,
            };

            assert_pixels_are_covered(camera, UVec2::new(182, 128), 32);
        }
    }

    #[test]
    fn visible_cells_at_the_largest_range() {
        let camera = CameraState {
            map_center: GeoCoordinate::from_degrees(47.3, 11.4),
            vertical_diameter: 24.38,
            aspect_ratio: 1.423,
            heading: 0.4,
            altitude: 0.0,
        };

        assert_pixels_are_covered(camera, UVec2::new(182, 128), 2);
    }
}
