use crate::schema::tile::coord::Coord;
use crate::schema::tile::error::TileWriteError;
use crate::schema::tile::record::MapId;

use thiserror::Error;


#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error in the tile store: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Tile store failed during reconciliation: {0}")]
    Store(#[from] StoreError),
    #[error("Could not write zoom tile: {0}")]
    Write(#[from] TileWriteError),
    #[error("An IO error during reconciliation: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum RebuildError {
    #[error("Tile store failed during full rebuild: {0}")]
    Store(#[from] StoreError),
    #[error("Could not write zoom tile: {0}")]
    Write(#[from] TileWriteError),
    #[error("An IO error during full rebuild: {0}")]
    Io(#[from] std::io::Error),
    #[error("Grid at {coord} on map {map_id} not found during zoom rebuild")]
    GridNotFound {
        coord: Coord,
        map_id: MapId,
    },
}
