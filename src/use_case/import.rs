use crate::schema::pyramid::config::ImportConfig;
use crate::schema::tile::record::{GridRecord, TileRecord};

use std::mem;
use std::vec::Vec;


/// Everything accumulated since the previous extraction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImportBatch {
    pub grids: Vec<GridRecord>,
    pub tiles: Vec<TileRecord>,
    pub storage_mb: f64,
}

impl ImportBatch {
    pub fn is_empty(&self) -> bool {
        self.grids.is_empty() && self.tiles.is_empty()
    }
}

/// Write buffer for bulk base tile ingestion. Holds no lock, so callers serialise access.
pub struct BatchImportAccumulator {
    pending: ImportBatch,
    batch_size: usize,
    disposed: bool,
}

impl BatchImportAccumulator {
    pub fn new(config: &ImportConfig) -> BatchImportAccumulator {
        BatchImportAccumulator::with_batch_size(config.batch_size)
    }

    pub fn with_batch_size(batch_size: usize) -> BatchImportAccumulator {
        BatchImportAccumulator {
            pending: ImportBatch::default(),
            batch_size,
            disposed: false,
        }
    }

    pub fn pending_grids(&self) -> usize {
        self.pending.grids.len()
    }

    pub fn pending_tiles(&self) -> usize {
        self.pending.tiles.len()
    }

    pub fn accumulated_storage_mb(&self) -> f64 {
        self.pending.storage_mb
    }

    pub fn has_pending_items(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn add_grid(&mut self, grid: GridRecord) -> () {
        self.pending.grids.push(grid);
    }

    pub fn add_tile(&mut self, tile: TileRecord) -> () {
        self.pending.tiles.push(tile);
    }

    pub fn add_storage(&mut self, size_mb: f64) -> () {
        self.pending.storage_mb += size_mb;
    }

    pub fn should_flush(&self) -> bool {
        self.pending.grids.len() >= self.batch_size
    }

    /// Hands over the pending grids, tiles and storage total, leaving the accumulator empty.
    pub fn extract_batch(&mut self) -> ImportBatch {
        mem::take(&mut self.pending)
    }

    pub fn reset(&mut self) -> () {
        self.pending = ImportBatch::default();
    }

    pub fn dispose(&mut self) -> () {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.reset();
    }
}

impl Drop for BatchImportAccumulator {
    fn drop(&mut self) {
        self.dispose();
    }
}
