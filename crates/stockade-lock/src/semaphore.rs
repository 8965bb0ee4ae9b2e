use stockade_core::config::LockStrategy;
use tracing::{debug, warn};

use crate::{
    connection::LockConnection,
    context::LockContext,
    error::Result,
    insert_if_absent::InsertIfAbsentSemaphore,
    select_for_update::SelectForUpdateSemaphore,
    table::{validate_lock_name, LockTable},
    update_row::UpdateLockRowSemaphore,
};

/// A named, cluster-wide lock whose lifetime is the caller's transaction.
///
/// Implementations only issue statements on the connection the context is
/// bound to.
/// Beginning, committing and rolling back stay with the caller, and commit or
/// rollback is what actually lets the next waiter in.
pub trait Semaphore: Send + Sync {
    /// Obtain `lock_name` inside the transaction `ctx` is bound to.
    ///
    /// Blocks for as long as the engine makes the statement wait. Obtaining a
    /// lock that `ctx` already holds is a no-op.
    fn obtain_lock(&self, ctx: &mut LockContext<'_>, lock_name: &str) -> Result<()>;

    /// Drop `lock_name` from `ctx`. The row lock stays with the engine until
    /// the transaction ends.
    fn release_lock(&self, ctx: &mut LockContext<'_>, lock_name: &str) {
        if ctx.forget(lock_name) {
            debug!(lock = lock_name, owner = ctx.owner(), "lock returned");
        } else {
            warn!(
                lock = lock_name,
                owner = ctx.owner(),
                "lock returned by a context that does not own it"
            );
        }
    }

    fn is_lock_owner(&self, ctx: &LockContext<'_>, lock_name: &str) -> bool {
        ctx.holds(lock_name)
    }

    /// Whether this semaphore needs a live connection to operate.
    fn requires_connection(&self) -> bool {
        true
    }

    /// Short strategy label for logs.
    fn strategy(&self) -> LockStrategy;
}

/// Build the semaphore selected by configuration.
pub fn build_semaphore(table: LockTable, strategy: LockStrategy) -> Box<dyn Semaphore> {
    match strategy {
        LockStrategy::UpdateRow => Box::new(UpdateLockRowSemaphore::new(table)),
        LockStrategy::SelectForUpdate => Box::new(SelectForUpdateSemaphore::new(table)),
        LockStrategy::InsertIfAbsent => Box::new(InsertIfAbsentSemaphore::new(table)),
    }
}

/// Shared bookkeeping around one strategy's locking statement.
///
/// Skips `acquire` when `ctx` already holds the lock, records the lock only
/// after `acquire` succeeds, and traces before and on failure.
pub(crate) fn obtain_tracked<F>(
    strategy: LockStrategy,
    ctx: &mut LockContext<'_>,
    lock_name: &str,
    acquire: F,
) -> Result<()>
where
    F: FnOnce(&dyn LockConnection) -> Result<()>,
{
    validate_lock_name(lock_name)?;

    if ctx.holds(lock_name) {
        debug!(lock = lock_name, owner = ctx.owner(), "lock already owned");
        return Ok(());
    }

    debug!(lock = lock_name, owner = ctx.owner(), %strategy, "lock desired");

    match acquire(ctx.connection()) {
        Ok(()) => {
            ctx.record(lock_name);
            debug!(lock = lock_name, owner = ctx.owner(), "lock obtained");
            Ok(())
        }
        Err(e) => {
            debug!(
                lock = lock_name,
                owner = ctx.owner(),
                kind = ?e.kind(),
                "lock not obtained: {e}"
            );
            Err(e)
        }
    }
}
