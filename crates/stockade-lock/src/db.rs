use rusqlite::Connection;
use tracing::info;

use crate::connection::classify;
use crate::error::{LockError, Result};
use crate::table::LockTable;

/// Initialise the lock table in `conn`.
///
/// Idempotent. Creates `{prefix}{table}` keyed by scheduler name and lock
/// name; there is no state column, holding a lock is a pending row write.
pub fn init_db(conn: &Connection, table: &LockTable) -> Result<()> {
    table.validate()?;
    let name = table.qualified_name();
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {name} (
            {sched} TEXT NOT NULL,
            {lock}  TEXT NOT NULL,
            PRIMARY KEY ({sched}, {lock})
        );",
        sched = table.sched_column(),
        lock = table.lock_column(),
    ))
    .map_err(|e| bootstrap_error(&name, e))?;
    Ok(())
}

/// Insert a row for every name in `lock_names` that is not provisioned yet.
///
/// Returns how many rows were created.
pub fn provision_locks<S: AsRef<str>>(
    conn: &Connection,
    table: &LockTable,
    lock_names: &[S],
) -> Result<usize> {
    let name = table.qualified_name();
    let mut stmt = conn
        .prepare(&format!(
            "INSERT OR IGNORE INTO {name} ({sched}, {lock}) VALUES (?1, ?2)",
            sched = table.sched_column(),
            lock = table.lock_column(),
        ))
        .map_err(|e| bootstrap_error(&name, e))?;

    let mut created = 0;
    for lock_name in lock_names {
        let lock_name = lock_name.as_ref();
        crate::table::validate_lock_name(lock_name)?;
        created += stmt
            .execute(rusqlite::params![table.sched_name(), lock_name])
            .map_err(|e| LockError::from_statement(lock_name, classify(e)))?;
    }
    if created > 0 {
        info!(table = %name, sched = table.sched_name(), created, "lock rows provisioned");
    }
    Ok(created)
}

/// Lock names provisioned for this scheduler instance, sorted.
pub fn list_locks(conn: &Connection, table: &LockTable) -> Result<Vec<String>> {
    let name = table.qualified_name();
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {lock} FROM {name} WHERE {sched} = ?1 ORDER BY {lock}",
            sched = table.sched_column(),
            lock = table.lock_column(),
        ))
        .map_err(|e| bootstrap_error(&name, e))?;

    let names = stmt
        .query_map([table.sched_name()], |row| row.get::<_, String>(0))
        .map_err(|e| bootstrap_error(&name, e))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| bootstrap_error(&name, e))?;
    Ok(names)
}

fn bootstrap_error(table: &str, err: rusqlite::Error) -> LockError {
    LockError::Table {
        table: table.to_string(),
        source: classify(err),
    }
}
