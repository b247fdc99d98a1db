use crate::schema::tile::coord::Coord;

use chrono::Utc;


pub type MapId = i32;

pub type Zoom = i32;

/// Zoom level of tiles captured directly by game clients.
pub const BASE_ZOOM: Zoom = 0;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// One rendered or ingested tile and the file that backs it.
#[derive(Clone, Debug, PartialEq)]
pub struct TileRecord {
    pub tenant_id: String,
    pub map_id: MapId,
    pub zoom: Zoom,
    pub coord: Coord,
    /// Relative to the grid storage root.
    pub file_path: String,
    /// Unix milliseconds of the last write.
    pub cache_timestamp: i64,
    pub file_size_bytes: u64,
}

impl TileRecord {
    pub fn file_size_mb(&self) -> f64 {
        bytes_to_mb(self.file_size_bytes)
    }
}

/// Persisted descriptor of a base tile uploaded by a client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GridRecord {
    pub id: String,
    pub coord: Coord,
    pub map_id: MapId,
    pub tenant_id: String,
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

pub fn now_timestamp() -> i64 {
    Utc::now().timestamp_millis()
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_bytes_to_mb() -> Result<(), Box<dyn Error>> {
        assert_eq!(1.0, bytes_to_mb(1024 * 1024), "Incorrect conversion of one megabyte");
        assert_eq!(0.5, bytes_to_mb(512 * 1024), "Incorrect conversion of half a megabyte");
        assert_eq!(0.0, bytes_to_mb(0), "Incorrect conversion of zero");
        Ok(())
    }

    #[test]
    fn test_file_size_mb() -> Result<(), Box<dyn Error>> {
        let record = TileRecord {
            tenant_id: String::from("t1"),
            map_id: 1,
            zoom: 2,
            coord: Coord::new(3, 4),
            file_path: String::from("a.png"),
            cache_timestamp: 10,
            file_size_bytes: 256 * 1024,
        };
        assert_eq!(0.25, record.file_size_mb(), "Incorrect record size in megabytes");
        Ok(())
    }
}
