use crate::core::identifier::CycleIdGenerator;
use crate::interface::session::SessionFactory;
use crate::schema::pyramid::config::RebuildConfig;
use crate::schema::pyramid::error::ReconcileError;
use crate::use_case::reconcile::ZoomTileReconciler;

use log::{debug, error, info};
use tokio::task;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use std::path::{Path, PathBuf};
use std::result::Result;
use std::sync::Arc;


/// Runs reconciliation cycles back to back with a pause in between, until cancelled.
pub struct ReconcileScheduler {
    config: RebuildConfig,
    storage_root: PathBuf,
    factory: Arc<dyn SessionFactory>,
}

impl ReconcileScheduler {
    pub fn new(
        config: &RebuildConfig,
        storage_root: &Path,
        factory: Arc<dyn SessionFactory>,
    ) -> ReconcileScheduler {
        ReconcileScheduler {
            config: config.clone(),
            storage_root: storage_root.to_path_buf(),
            factory,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) -> () {
        if !self.config.enabled {
            info!("ReconcileScheduler::run - zoom rebuild disabled");
            return;
        }
        info!(
            "ReconcileScheduler::run - start, every {:?} with budget {}",
            self.config.interval, self.config.max_tiles_per_run
        );
        let mut cycle_ids = CycleIdGenerator::new();
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            let cycle_id = cycle_ids.generate_id();
            let factory = Arc::clone(&self.factory);
            let storage_root = self.storage_root.clone();
            let max_tiles = self.config.max_tiles_per_run;
            let outcome = task::spawn_blocking(move || {
                run_cycle(factory.as_ref(), &storage_root, max_tiles)
            }).await;
            match outcome {
                Ok(Ok(0)) => debug!("ReconcileScheduler::run - cycle {} had nothing to do", cycle_id),
                Ok(Ok(rebuilt)) => info!("ReconcileScheduler::run - cycle {} rebuilt {} zoom tiles", cycle_id, rebuilt),
                Ok(Err(why)) => error!("ReconcileScheduler::run - cycle {} failed: {}", cycle_id, why),
                Err(why) => error!("ReconcileScheduler::run - cycle {} aborted: {}", cycle_id, why),
            }
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = sleep(self.config.interval) => (),
            }
        }
        info!("ReconcileScheduler::run - stopped");
    }
}

/// One reconciliation cycle over every tenant on a fresh session. The budget is shared by all
/// tenants of the cycle.
pub fn run_cycle(
    factory: &dyn SessionFactory,
    storage_root: &Path,
    max_tiles: usize,
) -> Result<usize, ReconcileError> {
    let session = factory.open_session()?;
    let context = session.context();
    let tenants = context.tiles.list_tenants()?;
    let reconciler = ZoomTileReconciler::new(context);
    let mut rebuilt = 0;
    for tenant_id in tenants.iter() {
        if rebuilt >= max_tiles {
            debug!("run_cycle - budget spent before tenant {}", tenant_id);
            break;
        }
        rebuilt += reconciler.rebuild_incomplete(tenant_id, storage_root, max_tiles - rebuilt);
    }
    return Ok(rebuilt);
}
