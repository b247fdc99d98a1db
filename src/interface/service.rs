use crate::schema::pyramid::error::StoreError;
use crate::schema::tile::record::TileRecord;

#[cfg(test)]
use mockall::automock;

use std::result::Result;


#[cfg_attr(test, automock)]
pub trait QuotaService {
    /// Adds `delta_mb` to the tenant's storage usage; negative deltas release storage.
    fn adjust(&self, tenant_id: &str, delta_mb: f64) -> Result<(), StoreError>;
}

#[cfg_attr(test, automock)]
pub trait TileUpdateNotifier {
    fn notify(&self, record: &TileRecord) -> ();
}


#[cfg(test)]
pub mod test_utils {
    use super::*;

    use std::cell::RefCell;
    use std::vec::Vec;


    pub struct NoOpTileUpdateNotifier {}

    impl NoOpTileUpdateNotifier {
        pub fn new() -> NoOpTileUpdateNotifier {
            NoOpTileUpdateNotifier { }
        }
    }

    impl TileUpdateNotifier for NoOpTileUpdateNotifier {
        fn notify(&self, _record: &TileRecord) -> () {
        }
    }

    pub struct RecordingQuotaService {
        pub deltas: RefCell<Vec<(String, f64)>>,
    }

    impl RecordingQuotaService {
        pub fn new() -> RecordingQuotaService {
            RecordingQuotaService {
                deltas: RefCell::new(Vec::new()),
            }
        }

        pub fn net_delta(&self, tenant_id: &str) -> f64 {
            self.deltas.borrow().iter()
                .filter(|(tenant, _)| tenant == tenant_id)
                .map(|(_, delta)| *delta)
                .sum()
        }

        pub fn clear(&self) -> () {
            self.deltas.borrow_mut().clear();
        }
    }

    impl QuotaService for RecordingQuotaService {
        fn adjust(&self, tenant_id: &str, delta_mb: f64) -> Result<(), StoreError> {
            self.deltas.borrow_mut().push((tenant_id.to_string(), delta_mb));
            Ok(())
        }
    }
}
