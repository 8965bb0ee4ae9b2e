use rusqlite::{Connection, Transaction};
use tracing::debug;

use crate::{context::LockContext, error::LockError, semaphore::Semaphore};

/// Run `work` in a fresh transaction while holding `lock_name`.
///
/// The unit of work is exactly this call: a new [`LockContext`] is created
/// for it and dropped at the end, whatever the outcome. `Ok` commits, which
/// releases the row lock. Failing to obtain the lock, or `work` returning
/// `Err`, rolls back. No retry happens here.
pub fn execute_in_lock<T, E, F>(
    conn: &mut Connection,
    semaphore: &dyn Semaphore,
    lock_name: &str,
    work: F,
) -> Result<T, E>
where
    F: FnOnce(&Transaction<'_>, &mut LockContext<'_>) -> Result<T, E>,
    E: From<LockError> + From<rusqlite::Error>,
{
    let tx = conn.transaction()?;
    let mut ctx = LockContext::anonymous(&tx);

    // Dropping `tx` on any early return rolls back.
    semaphore.obtain_lock(&mut ctx, lock_name)?;
    let value = work(&tx, &mut ctx)?;

    if semaphore.is_lock_owner(&ctx, lock_name) {
        semaphore.release_lock(&mut ctx, lock_name);
    }
    let owner = ctx.owner().to_string();
    drop(ctx);
    tx.commit()?;
    debug!(lock = lock_name, owner = %owner, "unit of work committed");
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, semaphore::build_semaphore, table::LockTable};
    use stockade_core::config::LockStrategy;

    #[derive(Debug)]
    enum TestError {
        Lock(LockError),
        Db(rusqlite::Error),
        Aborted,
    }

    impl From<LockError> for TestError {
        fn from(e: LockError) -> Self {
            TestError::Lock(e)
        }
    }

    impl From<rusqlite::Error> for TestError {
        fn from(e: rusqlite::Error) -> Self {
            TestError::Db(e)
        }
    }

    fn setup() -> (Connection, LockTable) {
        let conn = Connection::open_in_memory().expect("open");
        let table = LockTable::new("main");
        db::init_db(&conn, &table).expect("init");
        db::provision_locks(&conn, &table, &["TRIGGER_ACCESS"]).expect("provision");
        conn.execute_batch("CREATE TABLE work (v INTEGER NOT NULL);")
            .expect("work table");
        (conn, table)
    }

    fn work_rows(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM work", [], |row| row.get(0))
            .expect("count")
    }

    #[test]
    fn commits_work_done_under_lock() {
        let (mut conn, table) = setup();
        let sem = build_semaphore(table, LockStrategy::UpdateRow);

        let owned = execute_in_lock::<_, TestError, _>(&mut conn, sem.as_ref(), "TRIGGER_ACCESS", |tx, ctx| {
            tx.execute("INSERT INTO work (v) VALUES (1)", [])?;
            Ok(ctx.holds("TRIGGER_ACCESS"))
        })
        .expect("unit of work");

        assert!(owned);
        assert_eq!(work_rows(&conn), 1);
    }

    #[test]
    fn every_unit_of_work_takes_the_row_lock_again() {
        let (mut conn, table) = setup();
        let sem = build_semaphore(table, LockStrategy::UpdateRow);

        for _ in 0..2 {
            // The last statement before `work` runs is the lock row update.
            let changed = execute_in_lock::<_, TestError, _>(&mut conn, sem.as_ref(), "TRIGGER_ACCESS", |tx, _| {
                Ok(tx.changes())
            })
            .expect("unit of work");
            assert_eq!(changed, 1);
        }
    }

    #[test]
    fn work_error_rolls_back() {
        let (mut conn, table) = setup();
        let sem = build_semaphore(table, LockStrategy::UpdateRow);

        let result = execute_in_lock::<(), TestError, _>(&mut conn, sem.as_ref(), "TRIGGER_ACCESS", |tx, _| {
            tx.execute("INSERT INTO work (v) VALUES (1)", [])?;
            Err(TestError::Aborted)
        });

        assert!(matches!(result, Err(TestError::Aborted)));
        assert_eq!(work_rows(&conn), 0);
    }

    #[test]
    fn missing_lock_row_never_runs_work() {
        let (mut conn, table) = setup();
        let sem = build_semaphore(table, LockStrategy::UpdateRow);
        let mut ran = false;

        let result = execute_in_lock::<(), TestError, _>(&mut conn, sem.as_ref(), "STATE_ACCESS", |_, _| {
            ran = true;
            Ok(())
        });

        assert!(matches!(result, Err(TestError::Lock(LockError::MissingRow { .. }))));
        assert!(!ran);
    }

    #[test]
    fn database_errors_convert_through_caller_type() {
        let (mut conn, table) = setup();
        let sem = build_semaphore(table, LockStrategy::UpdateRow);

        let result = execute_in_lock::<(), TestError, _>(&mut conn, sem.as_ref(), "TRIGGER_ACCESS", |tx, _| {
            tx.execute("INSERT INTO missing_table (v) VALUES (1)", [])?;
            Ok(())
        });

        assert!(matches!(result, Err(TestError::Db(_))));
    }
}
