use crate::interface::service::TileUpdateNotifier;
use crate::schema::tile::coord::Coord;
use crate::schema::tile::record::{MapId, TileRecord, Zoom};

use log::trace;
use tokio::sync::broadcast;


pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// What subscribers learn about a freshly written zoom tile.
#[derive(Clone, Debug, PartialEq)]
pub struct TileUpdate {
    pub tenant_id: String,
    pub map_id: MapId,
    pub zoom: Zoom,
    pub coord: Coord,
    pub cache_timestamp: i64,
}

impl From<&TileRecord> for TileUpdate {
    fn from(record: &TileRecord) -> Self {
        TileUpdate {
            tenant_id: record.tenant_id.clone(),
            map_id: record.map_id,
            zoom: record.zoom,
            coord: record.coord,
            cache_timestamp: record.cache_timestamp,
        }
    }
}

/// Fans tile updates out to any number of subscribers. Lagging or absent subscribers never
/// hold up the writer.
#[derive(Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<TileUpdate>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> BroadcastNotifier {
        let (sender, _) = broadcast::channel(capacity.max(1));
        BroadcastNotifier { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TileUpdate> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        BroadcastNotifier::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl TileUpdateNotifier for BroadcastNotifier {
    fn notify(&self, record: &TileRecord) -> () {
        // an error only means nobody is listening
        if self.sender.send(TileUpdate::from(record)).is_err() {
            trace!("BroadcastNotifier::notify - no subscribers for {} at zoom {}", record.coord, record.zoom);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn record() -> TileRecord {
        TileRecord {
            tenant_id: String::from("t1"),
            map_id: 7,
            zoom: 2,
            coord: Coord::new(-1, 3),
            file_path: String::from("tenants/t1/7/2/-1_3.png"),
            cache_timestamp: 1234,
            file_size_bytes: 99,
        }
    }

    #[test]
    fn test_notify_without_subscribers() -> Result<(), Box<dyn Error>> {
        let notifier = BroadcastNotifier::new(4);
        notifier.notify(&record());
        Ok(())
    }

    #[test]
    fn test_subscribers_receive_updates() -> Result<(), Box<dyn Error>> {
        let notifier = BroadcastNotifier::new(4);
        let mut first = notifier.subscribe();
        let mut second = notifier.clone().subscribe();
        notifier.notify(&record());
        let expected = TileUpdate {
            tenant_id: String::from("t1"),
            map_id: 7,
            zoom: 2,
            coord: Coord::new(-1, 3),
            cache_timestamp: 1234,
        };
        assert_eq!(expected, first.try_recv()?, "First subscriber missed the update");
        assert_eq!(expected, second.try_recv()?, "Second subscriber missed the update");
        assert!(first.try_recv().is_err(), "Unexpected extra update");
        Ok(())
    }
}
