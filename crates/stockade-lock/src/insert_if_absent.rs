use stockade_core::config::LockStrategy;
use tracing::info;

use crate::{
    context::LockContext,
    error::{LockError, Result},
    semaphore::{obtain_tracked, Semaphore},
    table::{LockStatement, LockTable, UPDATE_LOCK_ROW_SQL},
    update_row::update_lock_row,
};

/// Row-update locking that provisions a missing lock row on first use.
///
/// A guarded insert runs before the update, inside the same transaction, so a
/// missing row is created once instead of being a fatal configuration error.
#[derive(Debug, Clone)]
pub struct InsertIfAbsentSemaphore {
    table: LockTable,
    insert: LockStatement,
    update: LockStatement,
}

impl InsertIfAbsentSemaphore {
    pub fn new(table: LockTable) -> Self {
        let insert = table.insert_statement();
        let update = table.lock_statement(UPDATE_LOCK_ROW_SQL);
        Self {
            table,
            insert,
            update,
        }
    }
}

impl Semaphore for InsertIfAbsentSemaphore {
    fn obtain_lock(&self, ctx: &mut LockContext<'_>, lock_name: &str) -> Result<()> {
        obtain_tracked(self.strategy(), ctx, lock_name, |conn| {
            let params = self.insert.params(self.table.sched_name(), lock_name);
            let inserted = conn
                .execute_non_query(self.insert.sql(), &params)
                .map_err(|e| LockError::from_statement(lock_name, e))?;
            if inserted > 0 {
                info!(
                    lock = lock_name,
                    table = %self.table.qualified_name(),
                    "lock row provisioned"
                );
            }
            update_lock_row(&self.table, &self.update, conn, lock_name)
        })
    }

    fn strategy(&self) -> LockStrategy {
        LockStrategy::InsertIfAbsent
    }
}
