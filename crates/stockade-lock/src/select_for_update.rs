use stockade_core::config::LockStrategy;

use crate::{
    context::LockContext,
    error::{LockError, Result},
    semaphore::{obtain_tracked, Semaphore},
    table::{LockStatement, LockTable, SELECT_FOR_UPDATE_SQL},
};

/// Takes the lock with a locking read (`SELECT ... FOR UPDATE`).
///
/// Only correct on engines where that read blocks other locking readers.
#[derive(Debug, Clone)]
pub struct SelectForUpdateSemaphore {
    table: LockTable,
    statement: LockStatement,
}

impl SelectForUpdateSemaphore {
    pub fn new(table: LockTable) -> Self {
        let statement = table.lock_statement(SELECT_FOR_UPDATE_SQL);
        Self { table, statement }
    }

    pub fn sql(&self) -> &str {
        self.statement.sql()
    }
}

impl Semaphore for SelectForUpdateSemaphore {
    fn obtain_lock(&self, ctx: &mut LockContext<'_>, lock_name: &str) -> Result<()> {
        obtain_tracked(self.strategy(), ctx, lock_name, |conn| {
            let params = self.statement.params(self.table.sched_name(), lock_name);
            let rows = conn
                .query_row_count(self.statement.sql(), &params)
                .map_err(|e| LockError::from_statement(lock_name, e))?;

            if rows == 0 {
                return Err(LockError::MissingRow {
                    lock_name: lock_name.to_string(),
                    table: self.table.qualified_name(),
                    sched_name: self.table.sched_name().to_string(),
                });
            }
            Ok(())
        })
    }

    fn strategy(&self) -> LockStrategy {
        LockStrategy::SelectForUpdate
    }
}
