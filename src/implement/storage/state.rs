use crate::interface::session::{PyramidContext, PyramidSession, SessionFactory};
use crate::implement::service::notifier::BroadcastNotifier;
use crate::implement::storage::sqlite::SqliteStore;
use crate::schema::pyramid::error::StoreError;

use log::debug;

use std::boxed::Box;
use std::path::{Path, PathBuf};
use std::result::Result;


/// One connection serving as tile store, grid store and quota service.
pub struct SqliteSession {
    store: SqliteStore,
    notifier: BroadcastNotifier,
}

impl SqliteSession {
    pub fn new(
        store: SqliteStore,
        notifier: BroadcastNotifier,
    ) -> SqliteSession {
        SqliteSession {
            store,
            notifier,
        }
    }
}

impl PyramidSession for SqliteSession {
    fn context(&self) -> PyramidContext<'_> {
        PyramidContext {
            tiles: &self.store,
            grids: &self.store,
            quota: &self.store,
            notifier: &self.notifier,
        }
    }
}

/// Opens a fresh connection to the same database for every session.
pub struct SqliteSessionFactory {
    database: PathBuf,
    notifier: BroadcastNotifier,
}

impl SqliteSessionFactory {
    pub fn new(
        database: &Path,
        notifier: BroadcastNotifier,
    ) -> SqliteSessionFactory {
        SqliteSessionFactory {
            database: database.to_path_buf(),
            notifier,
        }
    }
}

impl SessionFactory for SqliteSessionFactory {
    fn open_session(&self) -> Result<Box<dyn PyramidSession>, StoreError> {
        debug!("SqliteSessionFactory::open_session - opening {:?}", self.database);
        let store = SqliteStore::open(&self.database)?;
        Ok(Box::new(SqliteSession::new(store, self.notifier.clone())))
    }
}
