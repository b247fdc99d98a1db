use crate::implement::storage::file_system::TileFileSystem;
use crate::interface::session::PyramidContext;
use crate::schema::pyramid::error::ReconcileError;
use crate::schema::tile::coord::Coord;
use crate::schema::tile::record::{bytes_to_mb, now_timestamp, MapId, TileRecord, Zoom};
use crate::use_case::composite::TileCompositor;

use log::{debug, error, info, warn};

use std::path::Path;
use std::result::Result;


/// Lowest derived zoom level.
pub const MIN_ZOOM: Zoom = 1;

/// Deepest level worth rendering before whole maps collapse into a few pixels.
pub const MAX_ZOOM: Zoom = 6;

/// Bounded, incremental maintenance of one tenant's zoom pyramid.
pub struct ZoomTileReconciler<'c> {
    context: PyramidContext<'c>,
    compositor: TileCompositor,
}

struct Budget {
    limit: usize,
    spent: usize,
}

impl Budget {
    fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.spent)
    }

    fn is_exhausted(&self) -> bool {
        self.spent >= self.limit
    }
}

impl<'c> ZoomTileReconciler<'c> {
    pub fn new(context: PyramidContext<'c>) -> ZoomTileReconciler<'c> {
        ZoomTileReconciler::with_compositor(context, TileCompositor::new())
    }

    pub fn with_compositor(
        context: PyramidContext<'c>,
        compositor: TileCompositor,
    ) -> ZoomTileReconciler<'c> {
        ZoomTileReconciler {
            context,
            compositor,
        }
    }

    /// Creates missing and rebuilds stale zoom tiles of the tenant, level by level from
    /// `MIN_ZOOM` to `MAX_ZOOM`, until `max_tiles` composites have been written. Returns how
    /// many were written. Errors are logged and never returned.
    pub fn rebuild_incomplete(
        &self,
        tenant_id: &str,
        storage_root: &Path,
        max_tiles: usize,
    ) -> usize {
        debug!("ZoomTileReconciler::rebuild_incomplete - start tenant {} budget {}", tenant_id, max_tiles);
        let files = TileFileSystem::new(storage_root);
        let mut budget = Budget {
            limit: max_tiles,
            spent: 0,
        };
        if let Err(why) = self.reconcile_levels(tenant_id, &files, &mut budget) {
            error!(
                "ZoomTileReconciler::rebuild_incomplete - tenant {} stopped after {} tiles: {}",
                tenant_id, budget.spent, why
            );
        }
        if budget.spent > 0 {
            info!("ZoomTileReconciler::rebuild_incomplete - tenant {} rebuilt {} zoom tiles", tenant_id, budget.spent);
        }
        debug!("ZoomTileReconciler::rebuild_incomplete - finish tenant {}", tenant_id);
        return budget.spent;
    }

    fn reconcile_levels(
        &self,
        tenant_id: &str,
        files: &TileFileSystem,
        budget: &mut Budget,
    ) -> Result<(), ReconcileError> {
        for zoom in MIN_ZOOM..=MAX_ZOOM {
            if budget.is_exhausted() {
                debug!("ZoomTileReconciler::reconcile_levels - budget spent before zoom {}", zoom);
                break;
            }
            let created = self.create_missing(tenant_id, files, zoom, budget)?;
            let rebuilt = self.rebuild_stale(tenant_id, files, zoom, budget)?;
            if created > 0 || rebuilt > 0 {
                info!(
                    "ZoomTileReconciler::reconcile_levels - tenant {} zoom {}: created {}, rebuilt {}",
                    tenant_id, zoom, created, rebuilt
                );
            }
        }
        return Ok(());
    }

    fn create_missing(
        &self,
        tenant_id: &str,
        files: &TileFileSystem,
        zoom: Zoom,
        budget: &mut Budget,
    ) -> Result<usize, ReconcileError> {
        if budget.is_exhausted() {
            return Ok(0);
        }
        let missing = self.context.tiles.find_missing_parents(tenant_id, zoom, budget.remaining())?;
        let mut created = 0;
        for (map_id, coord) in missing.iter() {
            if budget.is_exhausted() {
                break;
            }
            match self.create_tile(tenant_id, files, *map_id, zoom, coord) {
                Ok(true) => {
                    created += 1;
                    budget.spent += 1;
                },
                Ok(false) => (),
                Err(why) => {
                    warn!(
                        "ZoomTileReconciler::create_missing - failed to create {} zoom {} map {}: {}",
                        coord, zoom, map_id, why
                    );
                },
            }
        }
        return Ok(created);
    }

    fn create_tile(
        &self,
        tenant_id: &str,
        files: &TileFileSystem,
        map_id: MapId,
        zoom: Zoom,
        coord: &Coord,
    ) -> Result<bool, ReconcileError> {
        if self.context.tiles.exists_at(tenant_id, map_id, zoom, coord)? {
            debug!("ZoomTileReconciler::create_tile - {} zoom {} already created", coord, zoom);
            return Ok(false);
        }
        let children = self.context.tiles.range_query(tenant_id, map_id, zoom - 1, &coord.child_box())?;
        if children.is_empty() {
            debug!("ZoomTileReconciler::create_tile - no children for {} zoom {}", coord, zoom);
            return Ok(false);
        }
        self.render_and_save(tenant_id, files, map_id, zoom, coord, &children)?;
        return Ok(true);
    }

    fn rebuild_stale(
        &self,
        tenant_id: &str,
        files: &TileFileSystem,
        zoom: Zoom,
        budget: &mut Budget,
    ) -> Result<usize, ReconcileError> {
        if budget.is_exhausted() {
            return Ok(0);
        }
        let stale = self.context.tiles.find_stale(tenant_id, zoom, budget.remaining())?;
        let mut rebuilt = 0;
        for record in stale.iter() {
            if budget.is_exhausted() {
                break;
            }
            match self.rebuild_tile(files, record) {
                Ok(true) => {
                    rebuilt += 1;
                    budget.spent += 1;
                },
                Ok(false) => (),
                Err(why) => {
                    warn!(
                        "ZoomTileReconciler::rebuild_stale - failed to rebuild {} zoom {} map {}: {}",
                        record.coord, zoom, record.map_id, why
                    );
                },
            }
        }
        return Ok(rebuilt);
    }

    fn rebuild_tile(
        &self,
        files: &TileFileSystem,
        stale: &TileRecord,
    ) -> Result<bool, ReconcileError> {
        let children = self.context.tiles.range_query(
            &stale.tenant_id,
            stale.map_id,
            stale.zoom - 1,
            &stale.coord.child_box(),
        )?;
        if children.is_empty() {
            return Ok(false);
        }
        let old_size = if files.exists(&stale.file_path) {
            files.file_size(&stale.file_path)?
        } else {
            0
        };
        self.render_and_save(&stale.tenant_id, files, stale.map_id, stale.zoom, &stale.coord, &children)?;
        if old_size > 0 {
            // The replacement is already published, so a failed refund must not fail the tile.
            if let Err(why) = self.context.quota.adjust(&stale.tenant_id, -bytes_to_mb(old_size)) {
                warn!(
                    "ZoomTileReconciler::rebuild_tile - could not refund {} bytes for {} zoom {}: {}",
                    old_size, stale.coord, stale.zoom, why
                );
            }
        }
        return Ok(true);
    }

    fn render_and_save(
        &self,
        tenant_id: &str,
        files: &TileFileSystem,
        map_id: MapId,
        zoom: Zoom,
        coord: &Coord,
        children: &[TileRecord],
    ) -> Result<TileRecord, ReconcileError> {
        debug_assert!(!children.is_empty(), "zoom tile {} composed without children", coord);
        let output = self.compositor.composite(
            self.context.tiles,
            Some(children),
            files,
            tenant_id,
            map_id,
            zoom,
            coord,
        )?;
        let newest_child = children.iter()
            .map(|child| child.cache_timestamp)
            .max()
            .unwrap_or(i64::MIN);
        let record = TileRecord {
            tenant_id: tenant_id.to_string(),
            map_id,
            zoom,
            coord: *coord,
            file_path: output.relative_path,
            cache_timestamp: now_timestamp().max(newest_child),
            file_size_bytes: output.file_size_bytes,
        };
        self.save_tile(&record)?;
        return Ok(record);
    }

    fn save_tile(&self, record: &TileRecord) -> Result<(), ReconcileError> {
        self.context.quota.adjust(&record.tenant_id, record.file_size_mb())?;
        self.context.tiles.upsert(record)?;
        self.context.notifier.notify(record);
        return Ok(());
    }
}
