// Two scheduler "processes" are modelled as two threads, each with its own
// SQLite connection to the same database file. SQLite serialises writers, so
// the row-update strategy blocks exactly as it would on a row-locking engine.

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use rusqlite::Connection;
use stockade_core::config::{LockStrategy, STATE_ACCESS, TRIGGER_ACCESS};
use stockade_lock::{
    build_semaphore, db, LockConnection, LockContext, LockError, LockErrorKind, LockTable,
    Semaphore, StatementError, UpdateLockRowSemaphore,
};

/// How long a blocked contender is given to (wrongly) get through.
const WAIT: Duration = Duration::from_millis(300);

fn table() -> LockTable {
    LockTable::new("cluster-a")
}

fn open(path: &Path, busy: Duration) -> Connection {
    let conn = Connection::open(path).expect("open db");
    conn.busy_timeout(busy).expect("busy timeout");
    conn
}

fn bootstrap(dir: &tempfile::TempDir) -> PathBuf {
    let path = dir.path().join("stockade.db");
    let conn = open(&path, Duration::from_secs(5));
    let mode: String = conn
        .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
        .expect("wal");
    assert_eq!(mode.to_lowercase(), "wal");
    db::init_db(&conn, &table()).expect("init");
    db::provision_locks(&conn, &table(), &[TRIGGER_ACCESS, STATE_ACCESS]).expect("provision");
    path
}

/// Passes statements through, counting them and remembering the last
/// affected-row count.
struct Observed<'c> {
    inner: &'c Connection,
    executed: Cell<usize>,
    last_affected: Cell<Option<usize>>,
}

impl<'c> Observed<'c> {
    fn new(inner: &'c Connection) -> Self {
        Self {
            inner,
            executed: Cell::new(0),
            last_affected: Cell::new(None),
        }
    }
}

impl LockConnection for Observed<'_> {
    fn execute_non_query(
        &self,
        sql: &str,
        params: &[(&str, &str)],
    ) -> Result<usize, StatementError> {
        self.executed.set(self.executed.get() + 1);
        let n = self.inner.execute_non_query(sql, params)?;
        self.last_affected.set(Some(n));
        Ok(n)
    }

    fn query_row_count(&self, sql: &str, params: &[(&str, &str)]) -> Result<usize, StatementError> {
        self.inner.query_row_count(sql, params)
    }
}

/// A holder thread that obtains `lock_name`, signals on the returned
/// receiver, then keeps its transaction open until told to commit.
struct Holder {
    handle: thread::JoinHandle<()>,
    acquired: mpsc::Receiver<()>,
    commit: mpsc::Sender<()>,
}

impl Holder {
    fn spawn(path: PathBuf, lock_name: &'static str, release_before_commit: bool) -> Self {
        let (acquired_tx, acquired) = mpsc::channel();
        let (commit, commit_rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            let sem = UpdateLockRowSemaphore::new(table());
            let mut conn = open(&path, Duration::from_secs(5));
            let tx = conn.transaction().expect("begin");
            let mut ctx = LockContext::new("holder", &tx);

            sem.obtain_lock(&mut ctx, lock_name).expect("holder obtains");
            if release_before_commit {
                sem.release_lock(&mut ctx, lock_name);
                assert!(!sem.is_lock_owner(&ctx, lock_name));
            }
            acquired_tx.send(()).expect("signal");

            commit_rx.recv().expect("commit signal");
            drop(ctx);
            tx.commit().expect("holder commits");
        });
        Self {
            handle,
            acquired,
            commit,
        }
    }

    fn wait_acquired(&self) {
        self.acquired.recv().expect("holder acquired");
    }

    fn commit_and_join(self) {
        self.commit.send(()).expect("holder alive");
        self.handle.join().expect("holder thread");
    }
}

/// Obtain `lock_name` on a fresh connection in a background thread and flag
/// once the statement returns.
fn spawn_contender(path: PathBuf, lock_name: &'static str) -> (thread::JoinHandle<()>, Arc<AtomicBool>) {
    let obtained = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&obtained);
    let handle = thread::spawn(move || {
        let sem = UpdateLockRowSemaphore::new(table());
        let mut conn = open(&path, Duration::from_secs(10));
        let tx = conn.transaction().expect("begin");
        let mut ctx = LockContext::new("contender", &tx);
        sem.obtain_lock(&mut ctx, lock_name).expect("contender obtains");
        flag.store(true, Ordering::SeqCst);
        drop(ctx);
        tx.commit().expect("contender commits");
    });
    (handle, obtained)
}

#[test]
fn provisioned_lock_updates_exactly_one_row() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let path = bootstrap(&dir);
    let mut conn = open(&path, Duration::from_secs(5));
    let tx = conn.transaction().expect("begin");
    let observed = Observed::new(&tx);
    let sem = UpdateLockRowSemaphore::new(table());
    let mut ctx = LockContext::new("worker", &observed);

    sem.obtain_lock(&mut ctx, TRIGGER_ACCESS).expect("obtain");

    assert_eq!(observed.last_affected.get(), Some(1));
    assert!(sem.is_lock_owner(&ctx, TRIGGER_ACCESS));
    drop(ctx);
    tx.commit().expect("commit");
}

#[test]
fn missing_row_fails_without_mutation() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let path = bootstrap(&dir);
    let mut conn = open(&path, Duration::from_secs(5));
    let before = db::list_locks(&conn, &table()).expect("list");

    let tx = conn.transaction().expect("begin");
    let sem = UpdateLockRowSemaphore::new(table());
    let mut ctx = LockContext::new("worker", &tx);
    let err = sem
        .obtain_lock(&mut ctx, "MISFIRE_ACCESS")
        .expect_err("no row provisioned");
    assert!(ctx.is_empty());
    assert_eq!(tx.changes(), 0);
    drop(ctx);
    tx.commit().expect("commit");

    assert_eq!(err.kind(), LockErrorKind::Configuration);
    assert!(matches!(err, LockError::MissingRow { .. }));
    assert_eq!(db::list_locks(&conn, &table()).expect("list"), before);
}

#[test]
fn second_transaction_waits_for_first_to_commit() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let path = bootstrap(&dir);
    let holder = Holder::spawn(path.clone(), TRIGGER_ACCESS, false);
    holder.wait_acquired();

    let (contender, obtained) = spawn_contender(path, TRIGGER_ACCESS);
    thread::sleep(WAIT);
    assert!(
        !obtained.load(Ordering::SeqCst),
        "contender obtained the lock while the holder's transaction was open"
    );

    holder.commit_and_join();
    contender.join().expect("contender thread");
    assert!(obtained.load(Ordering::SeqCst));
}

#[test]
fn release_does_not_end_engine_lock() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let path = bootstrap(&dir);
    let holder = Holder::spawn(path.clone(), STATE_ACCESS, true);
    holder.wait_acquired();

    let (contender, obtained) = spawn_contender(path, STATE_ACCESS);
    thread::sleep(WAIT);
    assert!(!obtained.load(Ordering::SeqCst));

    holder.commit_and_join();
    contender.join().expect("contender thread");
    assert!(obtained.load(Ordering::SeqCst));
}

#[test]
fn exhausted_wait_is_transient_and_retry_succeeds() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let path = bootstrap(&dir);
    let holder = Holder::spawn(path.clone(), TRIGGER_ACCESS, false);
    holder.wait_acquired();

    let sem = build_semaphore(table(), LockStrategy::UpdateRow);
    let mut conn = open(&path, Duration::from_millis(20));
    {
        let tx = conn.transaction().expect("begin");
        let mut ctx = LockContext::new("impatient", &tx);
        let err = sem
            .obtain_lock(&mut ctx, TRIGGER_ACCESS)
            .expect_err("wait must time out");
        assert_eq!(err.kind(), LockErrorKind::Transient);
        assert!(ctx.is_empty());
    }

    holder.commit_and_join();

    // Retrying is the caller's call, in a fresh transaction.
    let tx = conn.transaction().expect("begin again");
    let mut ctx = LockContext::new("impatient", &tx);
    sem.obtain_lock(&mut ctx, TRIGGER_ACCESS).expect("retry obtains");
    drop(ctx);
    tx.commit().expect("commit");
}

#[test]
fn next_transaction_on_same_connection_locks_again() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let path = bootstrap(&dir);
    let sem = UpdateLockRowSemaphore::new(table());
    let mut conn = open(&path, Duration::from_secs(5));

    for _ in 0..2 {
        let tx = conn.transaction().expect("begin");
        let observed = Observed::new(&tx);
        let mut ctx = LockContext::new("worker", &observed);
        sem.obtain_lock(&mut ctx, TRIGGER_ACCESS).expect("obtain");
        sem.obtain_lock(&mut ctx, TRIGGER_ACCESS).expect("re-entrant");
        assert_eq!(observed.executed.get(), 1);
        assert_eq!(observed.last_affected.get(), Some(1));
        drop(ctx);
        drop(observed);
        tx.commit().expect("commit");
    }
}

#[test]
fn different_lock_names_do_not_contend() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let path = bootstrap(&dir);
    let sem = UpdateLockRowSemaphore::new(table());

    let mut conn = open(&path, Duration::from_secs(5));
    let tx = conn.transaction().expect("begin");
    let mut ctx = LockContext::new("worker", &tx);
    sem.obtain_lock(&mut ctx, TRIGGER_ACCESS).expect("trigger");
    sem.obtain_lock(&mut ctx, STATE_ACCESS).expect("state");

    let held: Vec<_> = ctx.held_locks().collect();
    assert_eq!(held, vec![STATE_ACCESS, TRIGGER_ACCESS]);
    drop(ctx);
    tx.commit().expect("commit");
}

#[test]
fn other_cluster_rows_are_invisible() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let path = bootstrap(&dir);
    let sem = UpdateLockRowSemaphore::new(LockTable::new("cluster-b"));

    let mut conn = open(&path, Duration::from_secs(5));
    let tx = conn.transaction().expect("begin");
    let mut ctx = LockContext::new("worker", &tx);
    let err = sem
        .obtain_lock(&mut ctx, TRIGGER_ACCESS)
        .expect_err("cluster-b has no rows");

    assert!(matches!(
        err,
        LockError::MissingRow { ref sched_name, .. } if sched_name == "cluster-b"
    ));
}
