use crate::terrain_data::{AtlasFormat, HeightSample, PackedElevation, NO_DATA_ELEVATION};
use anyhow::{ensure, Result};
use bevy::math::UVec2;
use ndarray::{s, Array2, ArrayView2};

/// The samples stored inside an [`ElevationAtlas`].
#[derive(Clone, Debug)]
enum AtlasData {
    Packed(Array2<u16>),
    Raw(Array2<i16>),
}

/// The shared image all resident tiles are packed into.
///
/// The arrays are indexed `[row, column]`, so an atlas pixel `(x, y)` is stored at `[y, x]`.
#[derive(Clone, Debug)]
pub struct ElevationAtlas {
    data: AtlasData,
    size: UVec2,
}

impl ElevationAtlas {
    /// Creates an atlas of `size` pixels, in which every sample has no data.
    pub fn new(format: AtlasFormat, size: UVec2) -> Self {
        let shape = (size.y as usize, size.x as usize);

        let data = match format {
            AtlasFormat::Packed => {
                AtlasData::Packed(Array2::from_elem(shape, PackedElevation::NO_DATA.0))
            }
            AtlasFormat::Raw => AtlasData::Raw(Array2::from_elem(shape, NO_DATA_ELEVATION)),
        };

        Self { data, size }
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn format(&self) -> AtlasFormat {
        match self.data {
            AtlasData::Packed(_) => AtlasFormat::Packed,
            AtlasData::Raw(_) => AtlasFormat::Raw,
        }
    }

    /// Reads a single texel. The position has to lie inside of the atlas.
    #[inline]
    pub fn texel(&self, position: UVec2) -> HeightSample {
        let index = [position.y as usize, position.x as usize];

        match &self.data {
            AtlasData::Packed(data) => PackedElevation(data[index]).unpack(),
            AtlasData::Raw(data) => HeightSample::from_raw(data[index]),
        }
    }

    /// Copies the tile into the atlas, row by row, with the northern row at `offset.y`.
    pub fn write_tile(&mut self, offset: UVec2, tile_size: u32, heights: &[i16]) -> Result<()> {
        let size = tile_size as usize;

        ensure!(
            heights.len() == size * size,
            "tile has {} samples, expected {}",
            heights.len(),
            size * size
        );
        ensure!(
            offset.x + tile_size <= self.size.x && offset.y + tile_size <= self.size.y,
            "tile at {offset} exceeds the atlas of size {}",
            self.size
        );

        let source = ArrayView2::from_shape((size, size), heights)?;
        let (x, y) = (offset.x as usize, offset.y as usize);

        match &mut self.data {
            AtlasData::Packed(data) => {
                let mut target = data.slice_mut(s![y..y + size, x..x + size]);
                for (mut target_row, source_row) in
                    target.rows_mut().into_iter().zip(source.rows())
                {
                    for (texel, &height) in target_row.iter_mut().zip(source_row) {
                        *texel = PackedElevation::from_raw(height).0;
                    }
                }
            }
            AtlasData::Raw(data) => {
                data.slice_mut(s![y..y + size, x..x + size]).assign(&source);
            }
        }

        Ok(())
    }

    /// Resets the samples of a tile to no data.
    pub fn clear_tile(&mut self, offset: UVec2, tile_size: u32) {
        let (x, y, size) = (offset.x as usize, offset.y as usize, tile_size as usize);

        match &mut self.data {
            AtlasData::Packed(data) => data
                .slice_mut(s![y..y + size, x..x + size])
                .fill(PackedElevation::NO_DATA.0),
            AtlasData::Raw(data) => data
                .slice_mut(s![y..y + size, x..x + size])
                .fill(NO_DATA_ELEVATION),
        }
    }

    /// The samples in row-major order, as they would be uploaded to a texture.
    pub fn as_bytes(&self) -> &[u8] {
        let bytes = match &self.data {
            AtlasData::Packed(data) => data.as_slice().map(bytemuck::cast_slice::<_, u8>),
            AtlasData::Raw(data) => data.as_slice().map(bytemuck::cast_slice::<_, u8>),
        };

        bytes.unwrap_or_default()
    }
}
