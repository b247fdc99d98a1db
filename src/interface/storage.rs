use crate::schema::pyramid::error::StoreError;
use crate::schema::tile::coord::{Coord, CoordBox};
use crate::schema::tile::record::{GridRecord, MapId, TileRecord, Zoom};
use crate::use_case::import::ImportBatch;

#[cfg(test)]
use mockall::automock;

use std::result::Result;
use std::vec::Vec;


/// Tile records of every tenant. All set computations happen inside the store.
#[cfg_attr(test, automock)]
pub trait TileStore {
    fn get_tile(
        &self,
        tenant_id: &str,
        map_id: MapId,
        zoom: Zoom,
        coord: &Coord,
    ) -> Result<Option<TileRecord>, StoreError>;

    /// Distinct `(map, parent coord)` pairs of every tile at `zoom`.
    fn list_distinct_parents(
        &self,
        tenant_id: &str,
        zoom: Zoom,
    ) -> Result<Vec<(MapId, Coord)>, StoreError>;

    fn exists_at(
        &self,
        tenant_id: &str,
        map_id: MapId,
        zoom: Zoom,
        coord: &Coord,
    ) -> Result<bool, StoreError>;

    /// Parents of tiles at `zoom - 1` that have no tile at `zoom`, at most `limit` of them.
    fn find_missing_parents(
        &self,
        tenant_id: &str,
        zoom: Zoom,
        limit: usize,
    ) -> Result<Vec<(MapId, Coord)>, StoreError>;

    /// Tiles at `zoom` with at least one strictly newer child at `zoom - 1`.
    fn find_stale(
        &self,
        tenant_id: &str,
        zoom: Zoom,
        limit: usize,
    ) -> Result<Vec<TileRecord>, StoreError>;

    fn range_query(
        &self,
        tenant_id: &str,
        map_id: MapId,
        zoom: Zoom,
        area: &CoordBox,
    ) -> Result<Vec<TileRecord>, StoreError>;

    fn upsert(&self, record: &TileRecord) -> Result<(), StoreError>;

    fn list_tenants(&self) -> Result<Vec<String>, StoreError>;
}

#[cfg_attr(test, automock)]
pub trait GridStore {
    fn list_all_grids(&self) -> Result<Vec<GridRecord>, StoreError>;

    /// Persists an extracted import batch in one transaction.
    fn save_import_batch(
        &self,
        tenant_id: &str,
        batch: &ImportBatch,
    ) -> Result<(), StoreError>;
}
