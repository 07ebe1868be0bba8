//! Transaction manager - all-or-nothing units of work

use std::sync::Arc;

use rusqlite::TransactionBehavior;
use tracing::{debug, warn};

use super::dao::MeasurementDao;
use super::db::MeasurementDb;
use crate::config::DatastoreConfig;
use crate::Result;

/// Runs closures against a [`MeasurementDao`] inside one SQLite transaction.
///
/// The work commits only if it returns `Ok`; any error (validation,
/// not-found, constraint) rolls back every write made inside it.
#[derive(Clone)]
pub struct DatastoreManager {
    db: Arc<MeasurementDb>,
    config: Arc<DatastoreConfig>,
}

impl DatastoreManager {
    pub fn new(db: Arc<MeasurementDb>, config: DatastoreConfig) -> Self {
        Self {
            db,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &DatastoreConfig {
        &self.config
    }

    pub fn db(&self) -> &Arc<MeasurementDb> {
        &self.db
    }

    /// Run `work` in an immediate transaction and propagate its outcome
    pub fn transact<R, F>(&self, work: F) -> Result<R>
    where
        F: FnOnce(&mut MeasurementDao<'_>) -> Result<R>,
    {
        let mut conn = self.db.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let outcome = {
            let mut dao = MeasurementDao::new(&tx, &self.config);
            work(&mut dao)
        };

        match outcome {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!(error = %rollback_err, "rollback failed");
                }
                debug!(error = %err, "transaction rolled back");
                Err(err)
            }
        }
    }

    /// Run `work` for its side effects; `false` means nothing was committed
    pub fn run_in_transaction<F>(&self, work: F) -> bool
    where
        F: FnOnce(&mut MeasurementDao<'_>) -> Result<()>,
    {
        match self.transact(work) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "datastore transaction failed");
                false
            }
        }
    }

    /// Run `work` for its result; `None` means the transaction failed
    pub fn run_in_transaction_with_result<R, F>(&self, work: F) -> Option<R>
    where
        F: FnOnce(&mut MeasurementDao<'_>) -> Result<R>,
    {
        match self.transact(work) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(error = %err, "datastore transaction failed");
                None
            }
        }
    }
}
