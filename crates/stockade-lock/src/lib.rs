//! `stockade-lock` — database-backed cluster semaphore.
//!
//! # Overview
//!
//! Scheduler processes sharing one database coordinate through a lock table
//! holding one row per `(scheduler name, lock name)`. A lock is obtained by
//! issuing a row-locking statement inside the caller's transaction and is held
//! until that transaction commits or rolls back. The table stores no "locked"
//! flag; exclusion comes entirely from the engine's row write lock.
//!
//! # Strategies
//!
//! | Strategy           | Statement                              | Missing row          |
//! |--------------------|----------------------------------------|----------------------|
//! | `UpdateRow`        | `UPDATE .. SET LOCK_NAME = LOCK_NAME`  | configuration error  |
//! | `SelectForUpdate`  | `SELECT .. FOR UPDATE`                 | configuration error  |
//! | `InsertIfAbsent`   | guarded `INSERT`, then the `UPDATE`    | provisioned once     |
//!
//! None of them retry. Lock waits are bounded by the connection's own
//! timeout and surface as [`LockErrorKind::Transient`].

pub mod connection;
pub mod context;
pub mod db;
pub mod error;
pub mod insert_if_absent;
pub mod select_for_update;
pub mod semaphore;
pub mod table;
pub mod txn;
pub mod update_row;

pub use connection::LockConnection;
pub use context::LockContext;
pub use error::{BoxError, LockError, LockErrorKind, Result, StatementError};
pub use insert_if_absent::InsertIfAbsentSemaphore;
pub use select_for_update::SelectForUpdateSemaphore;
pub use semaphore::{build_semaphore, Semaphore};
pub use table::LockTable;
pub use txn::execute_in_lock;
pub use update_row::UpdateLockRowSemaphore;
