use std::collections::BTreeSet;
use std::fmt;

use uuid::Uuid;

use crate::connection::LockConnection;

/// Locks held by one logical unit of work, bound to its open transaction.
///
/// The context borrows the connection or transaction the locks are taken in,
/// so it cannot outlive that transaction: once the transaction is committed
/// or rolled back, the context holding its locks is gone too. Every unit of
/// work starts from a fresh, empty context.
///
/// ```compile_fail
/// use rusqlite::Connection;
/// use stockade_lock::{LockContext, LockTable, Semaphore, UpdateLockRowSemaphore};
///
/// let mut conn = Connection::open_in_memory().unwrap();
/// let sem = UpdateLockRowSemaphore::new(LockTable::new("main"));
/// let tx = conn.transaction().unwrap();
/// let mut ctx = LockContext::new("worker", &tx);
/// sem.obtain_lock(&mut ctx, "TRIGGER_ACCESS").unwrap();
/// tx.commit().unwrap();
/// // `ctx` still borrows the committed transaction.
/// sem.obtain_lock(&mut ctx, "TRIGGER_ACCESS").unwrap();
/// ```
pub struct LockContext<'tx> {
    conn: &'tx dyn LockConnection,
    owner: String,
    held: BTreeSet<String>,
}

impl<'tx> LockContext<'tx> {
    /// New empty context for the transaction open on `conn`, labelled `owner`
    /// in log output.
    pub fn new(owner: impl Into<String>, conn: &'tx dyn LockConnection) -> Self {
        Self {
            conn,
            owner: owner.into(),
            held: BTreeSet::new(),
        }
    }

    /// New empty context with a random owner label.
    pub fn anonymous(conn: &'tx dyn LockConnection) -> Self {
        Self::new(Uuid::new_v4().to_string(), conn)
    }

    /// The connection the locks of this context are taken on.
    pub fn connection(&self) -> &'tx dyn LockConnection {
        self.conn
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn holds(&self, lock_name: &str) -> bool {
        self.held.contains(lock_name)
    }

    /// Lock names currently held, in sorted order.
    pub fn held_locks(&self) -> impl Iterator<Item = &str> {
        self.held.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    pub(crate) fn record(&mut self, lock_name: &str) {
        self.held.insert(lock_name.to_string());
    }

    /// Returns false if the lock was not held.
    pub(crate) fn forget(&mut self, lock_name: &str) -> bool {
        self.held.remove(lock_name)
    }
}

impl fmt::Debug for LockContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockContext")
            .field("owner", &self.owner)
            .field("held", &self.held)
            .finish_non_exhaustive()
    }
}
