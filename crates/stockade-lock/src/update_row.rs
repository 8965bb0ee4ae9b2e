use stockade_core::config::LockStrategy;

use crate::{
    connection::LockConnection,
    context::LockContext,
    error::{LockError, Result},
    semaphore::{obtain_tracked, Semaphore},
    table::{LockStatement, LockTable, UPDATE_LOCK_ROW_SQL},
};

/// Takes the lock by writing to the lock row.
///
/// For engines where a plain or locking `SELECT` does not block other
/// selectors. The self-assignment `UPDATE` forces a row write lock, which the
/// engine holds until the transaction ends and queues concurrent writers on.
#[derive(Debug, Clone)]
pub struct UpdateLockRowSemaphore {
    table: LockTable,
    statement: LockStatement,
}

impl UpdateLockRowSemaphore {
    pub fn new(table: LockTable) -> Self {
        let statement = table.lock_statement(UPDATE_LOCK_ROW_SQL);
        Self { table, statement }
    }

    pub fn table(&self) -> &LockTable {
        &self.table
    }

    /// The rendered locking statement.
    pub fn sql(&self) -> &str {
        self.statement.sql()
    }
}

impl Semaphore for UpdateLockRowSemaphore {
    fn obtain_lock(&self, ctx: &mut LockContext<'_>, lock_name: &str) -> Result<()> {
        obtain_tracked(self.strategy(), ctx, lock_name, |conn| {
            update_lock_row(&self.table, &self.statement, conn, lock_name)
        })
    }

    fn strategy(&self) -> LockStrategy {
        LockStrategy::UpdateRow
    }
}

/// Run the row update; zero affected rows means the row was never provisioned.
pub(crate) fn update_lock_row(
    table: &LockTable,
    statement: &LockStatement,
    conn: &dyn LockConnection,
    lock_name: &str,
) -> Result<()> {
    let params = statement.params(table.sched_name(), lock_name);
    let affected = conn
        .execute_non_query(statement.sql(), &params)
        .map_err(|e| LockError::from_statement(lock_name, e))?;

    if affected == 0 {
        return Err(LockError::MissingRow {
            lock_name: lock_name.to_string(),
            table: table.qualified_name(),
            sched_name: table.sched_name().to_string(),
        });
    }
    Ok(())
}
