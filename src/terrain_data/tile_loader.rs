use crate::{math::TileGridCell, terrain_data::TileAtlas};
use anyhow::{bail, ensure, Context, Result};
use bevy::{
    prelude::*,
    tasks::{futures_lite::future, AsyncComputeTaskPool, Task, TaskPool},
    utils::HashMap,
};
use itertools::Itertools;
use rayon::prelude::*;
use slab::Slab;
use std::{
    collections::VecDeque,
    fs,
    io::Cursor,
    path::{Path, PathBuf},
    sync::Arc,
};
use tiff::decoder::{Decoder, DecodingResult};

/// Provides the elevation tiles, one per 1°×1° cell.
///
/// Tiles are `tile_size`×`tile_size` elevations in meters, row-major with the northern row
/// first. Water is encoded as [`WATER_ELEVATION`](super::WATER_ELEVATION) and samples
/// without data as [`NO_DATA_ELEVATION`](super::NO_DATA_ELEVATION).
pub trait TileSource: Send + Sync + 'static {
    fn tile_size(&self) -> u32;

    fn exists(&self, cell: TileGridCell) -> bool;

    fn existing_tiles(&self) -> Vec<TileGridCell> {
        TileGridCell::iter_all()
            .filter(|&cell| self.exists(cell))
            .collect_vec()
    }

    /// Loads the tile of the cell, returns `None` if there is no data for it.
    fn load(&self, cell: TileGridCell) -> Result<Option<Vec<i16>>>;
}

/// Keeps all tiles in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryTileSource {
    tile_size: u32,
    tiles: HashMap<TileGridCell, Vec<i16>>,
}

impl MemoryTileSource {
    pub fn new(tile_size: u32) -> Self {
        Self {
            tile_size,
            tiles: default(),
        }
    }

    /// Generates the tiles of the cells, `height` receives the cell and the sample position
    /// `(x, y)` inside of the tile.
    pub fn from_fn(
        tile_size: u32,
        cells: impl IntoIterator<Item = TileGridCell>,
        height: impl Fn(TileGridCell, u32, u32) -> i16,
    ) -> Self {
        let mut source = Self::new(tile_size);

        for cell in cells {
            let heights = (0..tile_size)
                .flat_map(|y| (0..tile_size).map(move |x| (x, y)))
                .map(|(x, y)| height(cell, x, y))
                .collect_vec();

            source.tiles.insert(cell, heights);
        }

        source
    }

    pub fn insert(&mut self, cell: TileGridCell, heights: Vec<i16>) -> Result<()> {
        let expected = (self.tile_size * self.tile_size) as usize;
        ensure!(
            heights.len() == expected,
            "tile {cell} has {} samples, expected {expected}",
            heights.len()
        );

        self.tiles.insert(cell, heights);
        Ok(())
    }
}

impl TileSource for MemoryTileSource {
    fn tile_size(&self) -> u32 {
        self.tile_size
    }

    fn exists(&self, cell: TileGridCell) -> bool {
        self.tiles.contains_key(&cell)
    }

    fn existing_tiles(&self) -> Vec<TileGridCell> {
        self.tiles.keys().copied().sorted().collect_vec()
    }

    fn load(&self, cell: TileGridCell) -> Result<Option<Vec<i16>>> {
        Ok(self.tiles.get(&cell).cloned())
    }
}

/// Reads tiles named after their south-west corner, e.g. `N47E011.bin` or `S34W071.tif`.
///
/// `.bin` files store little endian `i16` samples, `.tif` files a single band of integer
/// or floating point elevations.
pub struct DirectoryTileSource {
    tile_size: u32,
    files: HashMap<TileGridCell, PathBuf>,
}

impl DirectoryTileSource {
    /// Scans the directory for tile files.
    pub fn new(path: impl AsRef<Path>, tile_size: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut files = HashMap::default();

        let entries = fs::read_dir(&path)
            .with_context(|| format!("failed to read the tile directory {}", path.display()))?;

        for entry in entries {
            let file = entry?.path();

            let Some(extension) = file.extension().and_then(|extension| extension.to_str())
            else {
                continue;
            };
            if !matches!(extension, "bin" | "tif" | "tiff") {
                continue;
            }

            let Some(cell) = file
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<TileGridCell>().ok())
            else {
                continue;
            };

            files.insert(cell, file);
        }

        info!("Found {} tiles in {}.", files.len(), path.display());

        Ok(Self { tile_size, files })
    }

    fn read_bin(&self, file: &Path) -> Result<Vec<i16>> {
        let bytes = fs::read(file)?;
        let expected = (self.tile_size * self.tile_size) as usize * 2;

        ensure!(
            bytes.len() == expected,
            "{} has {} bytes, expected {expected}",
            file.display(),
            bytes.len()
        );

        Ok(bytes
            .chunks_exact(2)
            .map(|bytes| i16::from_le_bytes([bytes[0], bytes[1]]))
            .collect_vec())
    }

    fn read_tiff(&self, file: &Path) -> Result<Vec<i16>> {
        let bytes = fs::read(file)?;
        let mut decoder = Decoder::new(Cursor::new(bytes))?;

        let (width, height) = decoder.dimensions()?;
        ensure!(
            width == self.tile_size && height == self.tile_size,
            "{} is {width}x{height} pixels, expected {1}x{1}",
            file.display(),
            self.tile_size
        );

        let heights = match decoder.read_image()? {
            DecodingResult::I16(data) => data,
            DecodingResult::U16(data) => data.into_iter().map(|h| saturate(h as i32)).collect(),
            DecodingResult::I32(data) => data.into_iter().map(saturate).collect(),
            DecodingResult::F32(data) => data
                .into_iter()
                .map(|h| saturate(h.round() as i32))
                .collect(),
            DecodingResult::F64(data) => data
                .into_iter()
                .map(|h| saturate(h.round() as i32))
                .collect(),
            _ => bail!("{} has an unsupported sample format", file.display()),
        };

        Ok(heights)
    }
}

fn saturate(height: i32) -> i16 {
    height.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

impl TileSource for DirectoryTileSource {
    fn tile_size(&self) -> u32 {
        self.tile_size
    }

    fn exists(&self, cell: TileGridCell) -> bool {
        self.files.contains_key(&cell)
    }

    fn existing_tiles(&self) -> Vec<TileGridCell> {
        self.files.keys().copied().sorted().collect_vec()
    }

    fn load(&self, cell: TileGridCell) -> Result<Option<Vec<i16>>> {
        let Some(file) = self.files.get(&cell) else {
            return Ok(None);
        };

        let heights = match file.extension().and_then(|extension| extension.to_str()) {
            Some("bin") => self.read_bin(file),
            _ => self.read_tiff(file),
        }
        .with_context(|| format!("failed to load tile {cell}"))?;

        Ok(Some(heights))
    }
}

struct LoadingTile {
    cell: TileGridCell,
    task: Task<Result<Option<Vec<i16>>>>,
}

/// Loads the tiles requested by the [`TileAtlas`] from a [`TileSource`].
///
/// At most `max_loading` tiles are loaded at once on the [`AsyncComputeTaskPool`].
/// Finished tiles are inserted into the atlas once they are polled by
/// [`TileLoader::finish_loading`].
pub struct TileLoader {
    source: Arc<dyn TileSource>,
    to_load: VecDeque<TileGridCell>,
    loading_tiles: Slab<LoadingTile>,
    max_loading: usize,
}

impl TileLoader {
    pub fn new(source: Arc<dyn TileSource>, max_loading: usize) -> Self {
        Self {
            source,
            to_load: default(),
            loading_tiles: Slab::with_capacity(max_loading),
            max_loading: max_loading.max(1),
        }
    }

    pub fn source(&self) -> &Arc<dyn TileSource> {
        &self.source
    }

    /// Returns whether no tiles are queued or loading.
    pub fn is_idle(&self) -> bool {
        self.to_load.is_empty() && self.loading_tiles.is_empty()
    }

    pub fn request(&mut self, cells: impl IntoIterator<Item = TileGridCell>) {
        self.to_load.extend(cells);
    }

    pub fn start_loading(&mut self) {
        let pool = AsyncComputeTaskPool::get_or_init(TaskPool::new);

        while self.loading_tiles.len() < self.max_loading {
            let Some(cell) = self.to_load.pop_front() else {
                break;
            };

            let source = self.source.clone();

            self.loading_tiles.insert(LoadingTile {
                cell,
                task: pool.spawn(async move { source.load(cell) }),
            });
        }
    }

    /// Inserts the finished tiles into the atlas and returns their count.
    pub fn finish_loading(&mut self, atlas: &mut TileAtlas) -> usize {
        let mut finished = 0;

        self.loading_tiles.retain(|_, tile| {
            let Some(result) = future::block_on(future::poll_once(&mut tile.task)) else {
                return true;
            };

            if insert_loaded_tile(atlas, tile.cell, result) {
                finished += 1;
            }

            false
        });

        finished
    }

    /// Loads the cells in parallel and blocks until all of them are inserted.
    pub fn load_all(&self, atlas: &mut TileAtlas, cells: &[TileGridCell]) -> usize {
        let source = &self.source;

        let results = cells
            .par_iter()
            .map(|&cell| (cell, source.load(cell)))
            .collect::<Vec<_>>();

        let mut inserted = 0;

        for (cell, result) in results {
            if !atlas.is_resident(cell) && insert_loaded_tile(atlas, cell, result) {
                inserted += 1;
            }
        }

        inserted
    }
}

fn insert_loaded_tile(
    atlas: &mut TileAtlas,
    cell: TileGridCell,
    result: Result<Option<Vec<i16>>>,
) -> bool {
    match result {
        Ok(Some(heights)) => match atlas.insert_tile(cell, &heights) {
            Ok(_) => true,
            Err(error) => {
                warn!("{error:#}");
                atlas.cancel_request(cell);
                false
            }
        },
        Ok(None) => {
            atlas.mark_missing(cell);
            false
        }
        Err(error) => {
            error!("{error:#}");
            atlas.mark_missing(cell);
            false
        }
    }
}
