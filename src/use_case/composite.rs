use crate::implement::storage::file_system::TileFileSystem;
use crate::interface::storage::TileStore;
use crate::schema::tile::coord::{Coord, Quadrant};
use crate::schema::tile::error::TileWriteError;
use crate::schema::tile::record::{MapId, TileRecord, Zoom};

use enum_iterator::IntoEnumIterator;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use log::{debug, warn};

use std::result::Result;
use std::string::String;


/// Edge length of every tile in pixels. Base tiles are captured at this size too.
pub const TILE_PIXEL_SIZE: u32 = 100;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

#[derive(Clone, Debug, PartialEq)]
pub struct CompositeOutput {
    pub relative_path: String,
    pub file_size_bytes: u64,
    pub loaded_children: usize,
}

/// Renders a parent tile from its four children, each downscaled into one quadrant.
pub struct TileCompositor {
    tile_size: u32,
}

impl TileCompositor {
    pub fn new() -> TileCompositor {
        TileCompositor::with_tile_size(TILE_PIXEL_SIZE)
    }

    pub fn with_tile_size(tile_size: u32) -> TileCompositor {
        TileCompositor {
            tile_size,
        }
    }

    /// When `children` is given it is the only source of child records. Otherwise each child is
    /// looked up in `tiles` at `zoom - 1`. Unreadable children leave their quadrant transparent.
    pub fn composite(
        &self,
        tiles: &dyn TileStore,
        children: Option<&[TileRecord]>,
        files: &TileFileSystem,
        tenant_id: &str,
        map_id: MapId,
        zoom: Zoom,
        coord: &Coord,
    ) -> Result<CompositeOutput, TileWriteError> {
        debug!("TileCompositor::composite - start {} zoom {} map {}", coord, zoom, map_id);
        let quadrant_size = self.tile_size / 2;
        let mut canvas = RgbaImage::from_pixel(self.tile_size, self.tile_size, TRANSPARENT);
        let mut loaded_children = 0;
        for quadrant in Quadrant::into_enum_iter() {
            let child_coord = quadrant.child_of(coord);
            let child = match children {
                Some(supplied) => supplied.iter().find(|record| record.coord == child_coord).cloned(),
                None => TileCompositor::lookup_child(tiles, tenant_id, map_id, zoom - 1, &child_coord),
            };
            let record = match child {
                Some(record) => record,
                None => continue,
            };
            if !files.exists(&record.file_path) {
                debug!("TileCompositor::composite - child {} has no file at {:?}", child_coord, record.file_path);
                continue;
            }
            let image = match files.read_image(&record.file_path) {
                Ok(image) => image,
                Err(why) => {
                    warn!("TileCompositor::composite - skipping child {} at {}: {}", child_coord, record.file_path, why);
                    continue;
                },
            };
            let scaled = imageops::resize(&image, quadrant_size, quadrant_size, FilterType::Triangle);
            let (dx, dy) = quadrant.offset();
            imageops::replace(
                &mut canvas,
                &scaled,
                (quadrant_size as i32 * dx) as i64,
                (quadrant_size as i32 * dy) as i64,
            );
            loaded_children += 1;
        }

        if loaded_children == 0 {
            warn!("TileCompositor::composite - no children loaded for {} zoom {} map {}", coord, zoom, map_id);
        } else if loaded_children < 4 {
            debug!("TileCompositor::composite - loaded {} of 4 children for {} zoom {}", loaded_children, coord, zoom);
        }

        let relative_path = TileFileSystem::tile_relative_path(tenant_id, map_id, zoom, coord);
        let file_size_bytes = files.write_image(&relative_path, &canvas)?;
        debug!("TileCompositor::composite - finish {}", relative_path);
        return Ok(CompositeOutput {
            relative_path,
            file_size_bytes,
            loaded_children,
        });
    }

    fn lookup_child(
        tiles: &dyn TileStore,
        tenant_id: &str,
        map_id: MapId,
        zoom: Zoom,
        coord: &Coord,
    ) -> Option<TileRecord> {
        match tiles.get_tile(tenant_id, map_id, zoom, coord) {
            Ok(record) => record,
            Err(why) => {
                warn!("TileCompositor::lookup_child - lookup of {} zoom {} failed: {}", coord, zoom, why);
                None
            },
        }
    }
}
