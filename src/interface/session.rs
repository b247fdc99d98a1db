use crate::interface::service::{QuotaService, TileUpdateNotifier};
use crate::interface::storage::{GridStore, TileStore};
use crate::schema::pyramid::error::StoreError;

use std::boxed::Box;
use std::result::Result;


/// Collaborators borrowed from one session for the length of a single operation.
pub struct PyramidContext<'c> {
    pub tiles: &'c dyn TileStore,
    pub grids: &'c dyn GridStore,
    pub quota: &'c dyn QuotaService,
    pub notifier: &'c dyn TileUpdateNotifier,
}

/// An owned set of collaborator handles. A session is used by one thread at a time and never
/// outlives the cycle it was opened for.
pub trait PyramidSession {
    fn context(&self) -> PyramidContext<'_>;
}

pub trait SessionFactory: Send + Sync {
    fn open_session(&self) -> Result<Box<dyn PyramidSession>, StoreError>;
}
