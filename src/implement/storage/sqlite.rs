use crate::interface::service::QuotaService;
use crate::interface::storage::{GridStore, TileStore};
use crate::schema::pyramid::error::StoreError;
use crate::schema::tile::coord::{Coord, CoordBox};
use crate::schema::tile::record::{GridRecord, MapId, TileRecord, Zoom};
use crate::use_case::import::ImportBatch;

use const_format::concatcp;
use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Row};

use std::path::Path;
use std::result::Result;
use std::time::Duration;
use std::vec::Vec;


const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS tiles (
        tenant_id TEXT NOT NULL,
        map_id INTEGER NOT NULL,
        zoom INTEGER NOT NULL,
        coord_x INTEGER NOT NULL,
        coord_y INTEGER NOT NULL,
        file_path TEXT NOT NULL,
        cache_timestamp INTEGER NOT NULL,
        file_size_bytes INTEGER NOT NULL,
        PRIMARY KEY (tenant_id, map_id, zoom, coord_x, coord_y)
    );
    CREATE INDEX IF NOT EXISTS idx_tiles_tenant_zoom ON tiles (tenant_id, zoom);
    CREATE TABLE IF NOT EXISTS grids (
        id TEXT PRIMARY KEY NOT NULL,
        tenant_id TEXT NOT NULL,
        map_id INTEGER NOT NULL,
        coord_x INTEGER NOT NULL,
        coord_y INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS tenant_storage (
        tenant_id TEXT PRIMARY KEY NOT NULL,
        used_mb REAL NOT NULL DEFAULT 0
    );
";

const TILE_COLUMNS: &str =
    "tenant_id, map_id, zoom, coord_x, coord_y, file_path, cache_timestamp, file_size_bytes";

// SQLite integer division truncates towards zero, these round towards negative infinity
const PARENT_X: &str = "(coord_x - (((coord_x % 2) + 2) % 2)) / 2";
const PARENT_Y: &str = "(coord_y - (((coord_y % 2) + 2) % 2)) / 2";

const SELECT_TILE: &str = concatcp!(
    "SELECT ", TILE_COLUMNS, " FROM tiles",
    " WHERE tenant_id = ?1 AND map_id = ?2 AND zoom = ?3 AND coord_x = ?4 AND coord_y = ?5",
);

const SELECT_EXISTS: &str = "SELECT EXISTS (
    SELECT 1 FROM tiles
    WHERE tenant_id = ?1 AND map_id = ?2 AND zoom = ?3 AND coord_x = ?4 AND coord_y = ?5
)";

const SELECT_DISTINCT_PARENTS: &str = concatcp!(
    "SELECT DISTINCT map_id, ", PARENT_X, " AS parent_x, ", PARENT_Y, " AS parent_y",
    " FROM tiles WHERE tenant_id = ?1 AND zoom = ?2",
    " ORDER BY map_id, parent_x, parent_y",
);

const SELECT_MISSING_PARENTS: &str = concatcp!(
    "SELECT DISTINCT parent.map_id, parent.parent_x, parent.parent_y FROM (",
    "SELECT map_id, ", PARENT_X, " AS parent_x, ", PARENT_Y, " AS parent_y",
    " FROM tiles WHERE tenant_id = ?1 AND zoom = ?2",
    ") AS parent WHERE NOT EXISTS (",
    "SELECT 1 FROM tiles AS existing WHERE existing.tenant_id = ?1",
    " AND existing.map_id = parent.map_id AND existing.zoom = ?3",
    " AND existing.coord_x = parent.parent_x AND existing.coord_y = parent.parent_y",
    ") ORDER BY parent.map_id, parent.parent_x, parent.parent_y LIMIT ?4",
);

const SELECT_STALE: &str = concatcp!(
    "SELECT ", TILE_COLUMNS, " FROM tiles AS candidate",
    " WHERE candidate.tenant_id = ?1 AND candidate.zoom = ?2 AND EXISTS (",
    "SELECT 1 FROM tiles AS child WHERE child.tenant_id = candidate.tenant_id",
    " AND child.map_id = candidate.map_id AND child.zoom = ?3",
    " AND child.coord_x BETWEEN candidate.coord_x * 2 AND candidate.coord_x * 2 + 1",
    " AND child.coord_y BETWEEN candidate.coord_y * 2 AND candidate.coord_y * 2 + 1",
    " AND child.cache_timestamp > candidate.cache_timestamp",
    ") ORDER BY candidate.map_id, candidate.coord_x, candidate.coord_y LIMIT ?4",
);

const SELECT_RANGE: &str = concatcp!(
    "SELECT ", TILE_COLUMNS, " FROM tiles",
    " WHERE tenant_id = ?1 AND map_id = ?2 AND zoom = ?3",
    " AND coord_x BETWEEN ?4 AND ?5 AND coord_y BETWEEN ?6 AND ?7",
    " ORDER BY coord_x, coord_y",
);

const UPSERT_TILE: &str = concatcp!(
    "INSERT INTO tiles (", TILE_COLUMNS, ") VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    " ON CONFLICT (tenant_id, map_id, zoom, coord_x, coord_y) DO UPDATE SET",
    " file_path = excluded.file_path,",
    " cache_timestamp = excluded.cache_timestamp,",
    " file_size_bytes = excluded.file_size_bytes",
);

const UPSERT_GRID: &str = "INSERT INTO grids (id, tenant_id, map_id, coord_x, coord_y)
    VALUES (?1, ?2, ?3, ?4, ?5)
    ON CONFLICT (id) DO UPDATE SET
        tenant_id = excluded.tenant_id,
        map_id = excluded.map_id,
        coord_x = excluded.coord_x,
        coord_y = excluded.coord_y";

const ADJUST_QUOTA: &str = "INSERT INTO tenant_storage (tenant_id, used_mb) VALUES (?1, ?2)
    ON CONFLICT (tenant_id) DO UPDATE SET used_mb = used_mb + excluded.used_mb";

/// Tile, grid and quota persistence on a single SQLite connection.
pub struct SqliteStore {
    connection: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<SqliteStore, StoreError> {
        let connection = Connection::open(path)?;
        connection.busy_timeout(BUSY_TIMEOUT)?;
        return SqliteStore::with_connection(connection);
    }

    pub fn open_in_memory() -> Result<SqliteStore, StoreError> {
        SqliteStore::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(connection: Connection) -> Result<SqliteStore, StoreError> {
        connection.execute_batch(SCHEMA)?;
        Ok(SqliteStore { connection })
    }

    pub fn storage_used_mb(&self, tenant_id: &str) -> Result<f64, StoreError> {
        let used = self.connection.query_row(
            "SELECT used_mb FROM tenant_storage WHERE tenant_id = ?1",
            params![tenant_id],
            |row| row.get::<_, f64>(0),
        ).optional()?;
        Ok(used.unwrap_or(0.0))
    }

    fn upsert_with(connection: &Connection, record: &TileRecord) -> Result<(), StoreError> {
        connection.prepare_cached(UPSERT_TILE)?.execute(params![
            record.tenant_id,
            record.map_id,
            record.zoom,
            record.coord.x,
            record.coord.y,
            record.file_path,
            record.cache_timestamp,
            record.file_size_bytes as i64,
        ])?;
        Ok(())
    }

    fn adjust_with(connection: &Connection, tenant_id: &str, delta_mb: f64) -> Result<(), StoreError> {
        connection.prepare_cached(ADJUST_QUOTA)?.execute(params![tenant_id, delta_mb])?;
        Ok(())
    }

    fn query_parents(
        &self,
        sql: &str,
        parameters: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<(MapId, Coord)>, StoreError> {
        let mut statement = self.connection.prepare_cached(sql)?;
        let rows = statement.query_map(parameters, |row| {
            Ok((row.get::<_, MapId>(0)?, Coord::new(row.get(1)?, row.get(2)?)))
        })?;
        let mut parents = Vec::new();
        for row in rows {
            parents.push(row?);
        }
        return Ok(parents);
    }

    fn query_tiles(
        &self,
        sql: &str,
        parameters: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<TileRecord>, StoreError> {
        let mut statement = self.connection.prepare_cached(sql)?;
        let rows = statement.query_map(parameters, row_to_tile)?;
        let mut tiles = Vec::new();
        for row in rows {
            tiles.push(row?);
        }
        return Ok(tiles);
    }
}

fn row_to_tile(row: &Row<'_>) -> rusqlite::Result<TileRecord> {
    Ok(TileRecord {
        tenant_id: row.get(0)?,
        map_id: row.get(1)?,
        zoom: row.get(2)?,
        coord: Coord::new(row.get(3)?, row.get(4)?),
        file_path: row.get(5)?,
        cache_timestamp: row.get(6)?,
        file_size_bytes: row.get::<_, i64>(7)?.max(0) as u64,
    })
}

fn clamp_limit(limit: usize) -> i64 {
    limit.min(i64::MAX as usize) as i64
}

impl TileStore for SqliteStore {
    fn get_tile(
        &self,
        tenant_id: &str,
        map_id: MapId,
        zoom: Zoom,
        coord: &Coord,
    ) -> Result<Option<TileRecord>, StoreError> {
        let tile = self.connection.prepare_cached(SELECT_TILE)?
            .query_row(params![tenant_id, map_id, zoom, coord.x, coord.y], row_to_tile)
            .optional()?;
        Ok(tile)
    }

    fn list_distinct_parents(
        &self,
        tenant_id: &str,
        zoom: Zoom,
    ) -> Result<Vec<(MapId, Coord)>, StoreError> {
        self.query_parents(SELECT_DISTINCT_PARENTS, params![tenant_id, zoom])
    }

    fn exists_at(
        &self,
        tenant_id: &str,
        map_id: MapId,
        zoom: Zoom,
        coord: &Coord,
    ) -> Result<bool, StoreError> {
        let exists = self.connection.prepare_cached(SELECT_EXISTS)?
            .query_row(params![tenant_id, map_id, zoom, coord.x, coord.y], |row| row.get::<_, bool>(0))?;
        Ok(exists)
    }

    fn find_missing_parents(
        &self,
        tenant_id: &str,
        zoom: Zoom,
        limit: usize,
    ) -> Result<Vec<(MapId, Coord)>, StoreError> {
        debug!("SqliteStore::find_missing_parents - tenant {} zoom {} limit {}", tenant_id, zoom, limit);
        self.query_parents(
            SELECT_MISSING_PARENTS,
            params![tenant_id, zoom - 1, zoom, clamp_limit(limit)],
        )
    }

    fn find_stale(
        &self,
        tenant_id: &str,
        zoom: Zoom,
        limit: usize,
    ) -> Result<Vec<TileRecord>, StoreError> {
        debug!("SqliteStore::find_stale - tenant {} zoom {} limit {}", tenant_id, zoom, limit);
        self.query_tiles(SELECT_STALE, params![tenant_id, zoom, zoom - 1, clamp_limit(limit)])
    }

    fn range_query(
        &self,
        tenant_id: &str,
        map_id: MapId,
        zoom: Zoom,
        area: &CoordBox,
    ) -> Result<Vec<TileRecord>, StoreError> {
        self.query_tiles(
            SELECT_RANGE,
            params![tenant_id, map_id, zoom, area.min_x, area.max_x, area.min_y, area.max_y],
        )
    }

    fn upsert(&self, record: &TileRecord) -> Result<(), StoreError> {
        SqliteStore::upsert_with(&self.connection, record)
    }

    fn list_tenants(&self) -> Result<Vec<String>, StoreError> {
        let mut statement = self.connection.prepare_cached(
            "SELECT DISTINCT tenant_id FROM tiles ORDER BY tenant_id"
        )?;
        let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
        let mut tenants = Vec::new();
        for row in rows {
            tenants.push(row?);
        }
        return Ok(tenants);
    }
}

impl GridStore for SqliteStore {
    fn list_all_grids(&self) -> Result<Vec<GridRecord>, StoreError> {
        let mut statement = self.connection.prepare_cached(
            "SELECT id, tenant_id, map_id, coord_x, coord_y FROM grids ORDER BY id"
        )?;
        let rows = statement.query_map([], |row| {
            Ok(GridRecord {
                id: row.get(0)?,
                tenant_id: row.get(1)?,
                map_id: row.get(2)?,
                coord: Coord::new(row.get(3)?, row.get(4)?),
            })
        })?;
        let mut grids = Vec::new();
        for row in rows {
            grids.push(row?);
        }
        return Ok(grids);
    }

    fn save_import_batch(
        &self,
        tenant_id: &str,
        batch: &ImportBatch,
    ) -> Result<(), StoreError> {
        let transaction = self.connection.unchecked_transaction()?;
        {
            let mut insert_grid = transaction.prepare_cached(UPSERT_GRID)?;
            for grid in batch.grids.iter() {
                insert_grid.execute(params![grid.id, grid.tenant_id, grid.map_id, grid.coord.x, grid.coord.y])?;
            }
        }
        for tile in batch.tiles.iter() {
            SqliteStore::upsert_with(&transaction, tile)?;
        }
        if batch.storage_mb != 0.0 {
            SqliteStore::adjust_with(&transaction, tenant_id, batch.storage_mb)?;
        }
        transaction.commit()?;
        debug!(
            "SqliteStore::save_import_batch - saved {} grids and {} tiles for tenant {}",
            batch.grids.len(), batch.tiles.len(), tenant_id,
        );
        return Ok(());
    }
}

impl QuotaService for SqliteStore {
    fn adjust(&self, tenant_id: &str, delta_mb: f64) -> Result<(), StoreError> {
        SqliteStore::adjust_with(&self.connection, tenant_id, delta_mb)
    }
}


#[cfg(test)]
pub mod test_utils {
    use super::*;


    pub fn base_tile(tenant_id: &str, map_id: MapId, coord: Coord, cache_timestamp: i64) -> TileRecord {
        TileRecord {
            tenant_id: tenant_id.to_string(),
            map_id,
            zoom: 0,
            coord,
            file_path: format!("grids/{}-{}-{}.png", tenant_id, map_id, coord.name()),
            cache_timestamp,
            file_size_bytes: 0,
        }
    }
}
