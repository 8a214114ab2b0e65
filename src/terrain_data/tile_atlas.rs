use crate::{
    math::{DisplayMode, Range, TileGridCell, GRID_HEIGHT, GRID_WIDTH},
    terrain_data::{AtlasFormat, AtlasOffset, ElevationAtlas, TileGridMap, TileUsage},
};
use anyhow::{anyhow, Result};
use bevy::{
    math::UVec2,
    prelude::*,
    utils::{HashMap, HashSet},
};
use itertools::Itertools;
use slab::Slab;

/// The internal representation of a resident tile in a [`TileAtlas`].
struct AtlasSlot {
    cell: TileGridCell,
    /// The last frame in which the tile was sampled.
    last_used: u64,
}

/// Streams elevation tiles in and out of the [`ElevationAtlas`] and publishes their
/// locations in the [`TileGridMap`].
///
/// The atlas is split into square slots of `tile_size` pixels. A cell that exists but is not
/// resident is published as not-loaded, a cell without data as not-found.
/// Each frame the renderer flags the cells it sampled in the [`TileUsage`] and
/// [`TileAtlas::update`] turns these flags into requests for the tile loader.
/// When all slots are taken, the least recently used tile that was not sampled during the
/// last frame makes room for the new one. Cells are only requested while there is room
/// for them, the others are requested again in a later frame.
pub struct TileAtlas {
    atlas: ElevationAtlas,
    grid: TileGridMap,
    tile_size: u32,
    slots_per_row: u32,
    capacity: usize,
    slots: Slab<AtlasSlot>,
    resident: HashMap<TileGridCell, usize>,
    existing: HashSet<TileGridCell>,
    requested: HashSet<TileGridCell>,
    /// The count of slots that may still take a requested tile during this frame.
    room: usize,
    frame: u64,
}

impl TileAtlas {
    pub fn new(format: AtlasFormat, tile_size: u32, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let slots_per_row = (capacity as f64).sqrt().ceil() as u32;
        let rows = (capacity as u32).div_ceil(slots_per_row);
        let size = UVec2::new(slots_per_row, rows) * tile_size;

        Self {
            atlas: ElevationAtlas::new(format, size),
            grid: TileGridMap::new(size),
            tile_size,
            slots_per_row,
            capacity,
            slots: Slab::with_capacity(capacity),
            resident: default(),
            existing: default(),
            requested: default(),
            room: capacity,
            frame: 0,
        }
    }

    /// The slot count required to hold every tile visible at the range, for any heading,
    /// while the map center stays within `max_latitude` degrees of the equator.
    ///
    /// A degree of longitude shrinks towards the poles, so the count of columns is derived
    /// from the highest latitude the map may reach.
    pub fn capacity_for(range: Range, mode: DisplayMode, max_latitude: f64) -> usize {
        // the circle around the map, with room for the sampling margins
        let radius =
            0.5 * range.vertical_degrees() * (1.0 + mode.aspect_ratio().powi(2)).sqrt() + 0.5;
        let highest = max_latitude.abs() + radius;

        let rows = ((2.0 * radius).ceil() as u32 + 2).min(GRID_HEIGHT);
        let columns = if highest >= 90.0 {
            GRID_WIDTH
        } else {
            ((2.0 * radius / highest.to_radians().cos()).ceil() as u32 + 2).min(GRID_WIDTH)
        };

        (rows * columns) as usize
    }

    pub fn atlas(&self) -> &ElevationAtlas {
        &self.atlas
    }

    pub fn grid(&self) -> &TileGridMap {
        &self.grid
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn resident_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_resident(&self, cell: TileGridCell) -> bool {
        self.resident.contains_key(&cell)
    }

    pub fn exists(&self, cell: TileGridCell) -> bool {
        self.existing.contains(&cell)
    }

    /// Registers the cells for which data exists. They are published as not-loaded until
    /// their tiles are inserted.
    pub fn set_existing(&mut self, cells: impl IntoIterator<Item = TileGridCell>) {
        for cell in cells {
            if self.existing.insert(cell) && !self.is_resident(cell) {
                self.grid.set_not_loaded(cell);
            }
        }

        debug!("Tile atlas knows {} existing tiles.", self.existing.len());
    }

    /// Starts a new frame and returns the signalled cells, which have to be loaded.
    ///
    /// At most as many cells are returned as there are slots, which are free or hold a tile
    /// not sampled during the last frame, minus the requests still in flight.
    pub fn update(&mut self, usage: &TileUsage) -> Vec<TileGridCell> {
        self.frame += 1;

        let used = usage.used_cells().collect_vec();

        for cell in &used {
            if let Some(&key) = self.resident.get(cell) {
                self.slots[key].last_used = self.frame;
            }
        }

        let evictable = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.last_used < self.frame)
            .count();

        self.room = (self.capacity - self.slots.len() + evictable)
            .saturating_sub(self.requested.len());

        used.into_iter()
            .filter(|&cell| self.request(cell))
            .collect_vec()
    }

    /// Requests a cell, returns whether it has to be loaded.
    ///
    /// Requests beyond the room of the atlas are rejected, the cell stays not-loaded.
    pub fn request(&mut self, cell: TileGridCell) -> bool {
        if let Some(&key) = self.resident.get(&cell) {
            let slot = &mut self.slots[key];

            if slot.last_used < self.frame {
                slot.last_used = self.frame;
                self.room = self.room.saturating_sub(1);
            }

            return false;
        }

        if !self.existing.contains(&cell) || self.requested.contains(&cell) || self.room == 0 {
            return false;
        }

        self.room -= 1;
        self.requested.insert(cell)
    }

    /// The count of cells that may still be requested during this frame.
    pub fn room(&self) -> usize {
        self.room
    }

    /// Copies the tile into a free slot and publishes its offset.
    pub fn insert_tile(&mut self, cell: TileGridCell, heights: &[i16]) -> Result<AtlasOffset> {
        self.requested.remove(&cell);
        self.existing.insert(cell);

        let key = match self.resident.get(&cell) {
            Some(&key) => key,
            None => {
                if self.slots.len() == self.capacity {
                    self.evict_least_recently_used()
                        .ok_or_else(|| anyhow!("tile atlas is full, can not insert {cell}"))?;
                }

                let key = self.slots.insert(AtlasSlot {
                    cell,
                    last_used: self.frame,
                });
                self.resident.insert(cell, key);
                key
            }
        };

        let offset = self.slot_offset(key);

        if let Err(error) = self.atlas.write_tile(offset, self.tile_size, heights) {
            self.release_tile(cell);
            return Err(error.context(format!("failed to insert tile {cell}")));
        }

        self.grid.set_resident(cell, offset);

        debug!("Inserted tile {cell} at {offset}.");

        Ok(offset.into())
    }

    /// Frees the slot of the cell, it will be published as not-loaded again.
    pub fn release_tile(&mut self, cell: TileGridCell) {
        if let Some(key) = self.resident.remove(&cell) {
            self.slots.remove(key);
            self.atlas.clear_tile(self.slot_offset(key), self.tile_size);
        }

        if self.existing.contains(&cell) {
            self.grid.set_not_loaded(cell);
        } else {
            self.grid.set_not_found(cell);
        }
    }

    /// Records that there is no data for the cell after all.
    pub fn mark_missing(&mut self, cell: TileGridCell) {
        if self.requested.remove(&cell) {
            self.room += 1;
        }
        self.existing.remove(&cell);
        self.release_tile(cell);

        debug!("Tile {cell} has no data.");
    }

    /// Gives up on a request, the cell stays not-loaded and may be requested again.
    pub fn cancel_request(&mut self, cell: TileGridCell) {
        self.requested.remove(&cell);
    }

    fn evict_least_recently_used(&mut self) -> Option<()> {
        let (_, slot) = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.last_used < self.frame)
            .min_by_key(|(_, slot)| slot.last_used)?;

        let cell = slot.cell;
        self.release_tile(cell);

        debug!("Evicted tile {cell}.");

        Some(())
    }

    fn slot_offset(&self, key: usize) -> UVec2 {
        let key = key as u32;
        UVec2::new(key % self.slots_per_row, key / self.slots_per_row) * self.tile_size
    }
}
