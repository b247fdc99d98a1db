use crate::implement::storage::file_system::TileFileSystem;
use crate::interface::session::PyramidContext;
use crate::schema::pyramid::error::RebuildError;
use crate::schema::tile::coord::Coord;
use crate::schema::tile::record::{bytes_to_mb, now_timestamp, GridRecord, MapId, TileRecord, Zoom, BASE_ZOOM};
use crate::use_case::composite::TileCompositor;
use crate::use_case::reconcile::{MAX_ZOOM, MIN_ZOOM};

use log::{debug, info, warn};

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::result::Result;


/// Unbounded rebuild of every pyramid from the legacy `grids/` layout.
///
/// Maintenance tool only. Grids are looked up by the zoom tile's own coordinate at every level,
/// which matches the flat single tenant layout it was written for and nothing else.
pub struct WavefrontRebuilder<'c> {
    context: PyramidContext<'c>,
    compositor: TileCompositor,
}

impl<'c> WavefrontRebuilder<'c> {
    pub fn new(context: PyramidContext<'c>) -> WavefrontRebuilder<'c> {
        WavefrontRebuilder {
            context,
            compositor: TileCompositor::new(),
        }
    }

    pub fn rebuild_all(&self, storage_root: &Path) -> Result<(), RebuildError> {
        warn!("WavefrontRebuilder::rebuild_all - legacy rebuild, not adapted to multi-tenant storage");
        let files = TileFileSystem::new(storage_root);
        let grids = self.context.grids.list_all_grids()?;
        let owners: HashMap<(MapId, Coord), &GridRecord> = grids.iter()
            .map(|grid| ((grid.map_id, grid.coord), grid))
            .collect();

        let mut wavefront = BTreeSet::new();
        let mut saved = 0;
        for grid in grids.iter() {
            wavefront.insert((grid.map_id, grid.coord.parent()));
            let file_path = TileFileSystem::grid_relative_path(&grid.id);
            if !files.exists(&file_path) {
                debug!("WavefrontRebuilder::rebuild_all - no file for grid {}", grid.id);
                continue;
            }
            let record = TileRecord {
                tenant_id: grid.tenant_id.clone(),
                map_id: grid.map_id,
                zoom: BASE_ZOOM,
                coord: grid.coord,
                file_size_bytes: files.file_size(&file_path)?,
                file_path,
                cache_timestamp: now_timestamp(),
            };
            // Ingestion already counted base tile files against quota.
            self.publish_tile(&record)?;
            saved += 1;
        }
        info!("WavefrontRebuilder::rebuild_all - saved {} of {} base tiles", saved, grids.len());

        for zoom in MIN_ZOOM..=MAX_ZOOM {
            let mut next = BTreeSet::new();
            for (map_id, coord) in wavefront.iter() {
                let owner = owners.get(&(*map_id, *coord)).ok_or(RebuildError::GridNotFound {
                    coord: *coord,
                    map_id: *map_id,
                })?;
                let old_size = self.existing_file_size(&files, &owner.tenant_id, *map_id, zoom, coord)?;
                let output = self.compositor.composite(
                    self.context.tiles,
                    None,
                    &files,
                    &owner.tenant_id,
                    *map_id,
                    zoom,
                    coord,
                )?;
                if output.loaded_children == 0 {
                    warn!("WavefrontRebuilder::rebuild_all - empty composite for {} zoom {} map {}", coord, zoom, map_id);
                }
                self.save_tile(&TileRecord {
                    tenant_id: owner.tenant_id.clone(),
                    map_id: *map_id,
                    zoom,
                    coord: *coord,
                    file_path: output.relative_path,
                    cache_timestamp: now_timestamp(),
                    file_size_bytes: output.file_size_bytes,
                })?;
                if old_size > 0 {
                    self.context.quota.adjust(&owner.tenant_id, -bytes_to_mb(old_size))?;
                }
                next.insert((*map_id, coord.parent()));
            }
            info!("WavefrontRebuilder::rebuild_all - zoom {}: composed {} tiles", zoom, wavefront.len());
            wavefront = next;
        }
        return Ok(());
    }

    fn existing_file_size(
        &self,
        files: &TileFileSystem,
        tenant_id: &str,
        map_id: MapId,
        zoom: Zoom,
        coord: &Coord,
    ) -> Result<u64, RebuildError> {
        return match self.context.tiles.get_tile(tenant_id, map_id, zoom, coord)? {
            Some(existing) if files.exists(&existing.file_path) => Ok(files.file_size(&existing.file_path)?),
            _ => Ok(0),
        };
    }

    fn save_tile(&self, record: &TileRecord) -> Result<(), RebuildError> {
        self.context.quota.adjust(&record.tenant_id, record.file_size_mb())?;
        return self.publish_tile(record);
    }

    fn publish_tile(&self, record: &TileRecord) -> Result<(), RebuildError> {
        self.context.tiles.upsert(record)?;
        self.context.notifier.notify(record);
        return Ok(());
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::implement::storage::file_system::test_utils::solid_tile;
    use crate::implement::storage::sqlite::SqliteStore;
    use crate::interface::service::test_utils::{NoOpTileUpdateNotifier, RecordingQuotaService};
    use crate::interface::storage::{GridStore, TileStore};
    use crate::use_case::composite::TILE_PIXEL_SIZE;
    use crate::use_case::import::ImportBatch;
    use mktemp::Temp;
    use std::error::Error;

    fn grid(id: &str, coord: Coord) -> GridRecord {
        GridRecord {
            id: id.to_string(),
            coord,
            map_id: 1,
            tenant_id: String::from("t1"),
        }
    }

    fn save_grids(store: &SqliteStore, grids: Vec<GridRecord>) -> Result<(), Box<dyn Error>> {
        store.save_import_batch("t1", &ImportBatch {
            grids,
            tiles: Vec::new(),
            storage_mb: 0.0,
        })?;
        Ok(())
    }

    #[test]
    fn test_rebuild_all_builds_every_level() -> Result<(), Box<dyn Error>> {
        let root = Temp::new_dir()?;
        let root_path: &Path = root.as_ref();
        let files = TileFileSystem::new(root_path);
        let store = SqliteStore::open_in_memory()?;
        let quota = RecordingQuotaService::new();
        let notifier = NoOpTileUpdateNotifier::new();
        files.write_image(&TileFileSystem::grid_relative_path("a"), &solid_tile(TILE_PIXEL_SIZE, [200, 0, 0, 255]))?;
        files.write_image(&TileFileSystem::grid_relative_path("b"), &solid_tile(TILE_PIXEL_SIZE, [0, 200, 0, 255]))?;
        save_grids(&store, vec![
            grid("a", Coord::new(0, 0)),
            grid("b", Coord::new(1, 0)),
            grid("c", Coord::new(0, 1)),
        ])?;

        let context = PyramidContext {
            tiles: &store,
            grids: &store,
            quota: &quota,
            notifier: &notifier,
        };
        WavefrontRebuilder::new(context).rebuild_all(root_path)?;

        assert!(store.exists_at("t1", 1, 0, &Coord::new(0, 0))?, "Base tile a not saved");
        assert!(store.exists_at("t1", 1, 0, &Coord::new(1, 0))?, "Base tile b not saved");
        assert!(!store.exists_at("t1", 1, 0, &Coord::new(0, 1))?, "Grid without a file was saved");
        for zoom in MIN_ZOOM..=MAX_ZOOM {
            assert!(store.exists_at("t1", 1, zoom, &Coord::new(0, 0))?, "Zoom {} not built", zoom);
        }
        let zoom_one = store.get_tile("t1", 1, 1, &Coord::new(0, 0))?.expect("Zoom 1 tile should exist");
        let image = files.read_image(&zoom_one.file_path)?;
        assert_eq!(255, image.get_pixel(25, 25).0[3], "Grid a quadrant should be filled");
        assert_eq!(255, image.get_pixel(75, 25).0[3], "Grid b quadrant should be filled");
        assert_eq!(0, image.get_pixel(25, 75).0[3], "Grid c has no file and should stay transparent");
        assert!(quota.net_delta("t1") > 0.0, "Rebuild should consume quota");
        Ok(())
    }

    #[test]
    fn test_rebuild_all_twice_keeps_quota_exact() -> Result<(), Box<dyn Error>> {
        let root = Temp::new_dir()?;
        let root_path: &Path = root.as_ref();
        let files = TileFileSystem::new(root_path);
        let store = SqliteStore::open_in_memory()?;
        let quota = RecordingQuotaService::new();
        let notifier = NoOpTileUpdateNotifier::new();
        files.write_image(&TileFileSystem::grid_relative_path("a"), &solid_tile(TILE_PIXEL_SIZE, [200, 0, 0, 255]))?;
        save_grids(&store, vec![grid("a", Coord::new(0, 0))])?;
        let context = PyramidContext {
            tiles: &store,
            grids: &store,
            quota: &quota,
            notifier: &notifier,
        };
        let rebuilder = WavefrontRebuilder::new(context);

        rebuilder.rebuild_all(root_path)?;
        let levels = (MAX_ZOOM - MIN_ZOOM + 1) as usize;
        assert_eq!(levels, quota.deltas.borrow().len(), "Only zoom tiles should be charged");
        rebuilder.rebuild_all(root_path)?;

        let mut on_disk = 0.0;
        for zoom in MIN_ZOOM..=MAX_ZOOM {
            let path = TileFileSystem::tile_relative_path("t1", 1, zoom, &Coord::new(0, 0));
            on_disk += bytes_to_mb(files.file_size(&path)?);
        }
        let net = quota.net_delta("t1");
        assert!((net - on_disk).abs() < 1e-9, "Net quota {} does not match zoom files on disk {}", net, on_disk);
        Ok(())
    }

    #[test]
    fn test_missing_owner_is_fatal() -> Result<(), Box<dyn Error>> {
        let root = Temp::new_dir()?;
        let root_path: &Path = root.as_ref();
        let store = SqliteStore::open_in_memory()?;
        let quota = RecordingQuotaService::new();
        let notifier = NoOpTileUpdateNotifier::new();
        save_grids(&store, vec![grid("far", Coord::new(6, 6))])?;
        let context = PyramidContext {
            tiles: &store,
            grids: &store,
            quota: &quota,
            notifier: &notifier,
        };
        match WavefrontRebuilder::new(context).rebuild_all(root_path) {
            Err(RebuildError::GridNotFound { coord, map_id }) => {
                assert_eq!(Coord::new(3, 3), coord, "Unexpected missing coord");
                assert_eq!(1, map_id, "Unexpected missing map");
            },
            other => panic!("Expected GridNotFound, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_empty_store_is_a_no_op() -> Result<(), Box<dyn Error>> {
        let root = Temp::new_dir()?;
        let root_path: &Path = root.as_ref();
        let store = SqliteStore::open_in_memory()?;
        let quota = RecordingQuotaService::new();
        let notifier = NoOpTileUpdateNotifier::new();
        let context = PyramidContext {
            tiles: &store,
            grids: &store,
            quota: &quota,
            notifier: &notifier,
        };
        WavefrontRebuilder::new(context).rebuild_all(root_path)?;
        assert!(store.list_tenants()?.is_empty(), "Nothing should have been saved");
        Ok(())
    }
}
