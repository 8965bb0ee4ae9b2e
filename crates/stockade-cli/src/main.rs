use std::path::Path;
use std::time::Duration;

use clap::{Parser, Subcommand};
use rusqlite::Connection;
use stockade_core::config::StockadeConfig;
use stockade_lock::{build_semaphore, db, LockContext, LockTable, Semaphore};
use tracing::{info, warn};

/// Operator tool for the cluster lock table.
#[derive(Debug, Parser)]
#[command(name = "stockade", version, about)]
struct Cli {
    /// Config file (default: $STOCKADE_CONFIG or ~/.stockade/stockade.toml).
    #[arg(long, short)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the lock table and provision the configured lock rows.
    Init,
    /// List lock rows provisioned for this scheduler instance.
    Locks,
    /// Obtain a lock in a throwaway transaction, then roll back.
    Check { lock_name: String },
    /// Obtain a lock and keep it for a while before committing.
    Hold {
        lock_name: String,
        #[arg(long, default_value_t = 10)]
        secs: u64,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stockade_cli=info,stockade_lock=info".into()),
        )
        .init();

    let cli = Cli::parse();

    // explicit flag > STOCKADE_CONFIG env > ~/.stockade/stockade.toml
    let config_path = cli.config.or_else(|| std::env::var("STOCKADE_CONFIG").ok());
    let config = StockadeConfig::load(config_path.as_deref())
        .map_err(|e| anyhow::anyhow!("[{}] {e}", e.code()))?;

    let table = LockTable::from_config(&config.scheduler.instance_name, &config.lock)?;
    let mut conn = open_db(&config)?;

    match cli.command {
        Command::Init => {
            db::init_db(&conn, &table)?;
            let created = db::provision_locks(&conn, &table, config.lock.lock_names.as_slice())?;
            info!(
                table = %table.qualified_name(),
                sched = table.sched_name(),
                created,
                "lock table ready"
            );
        }
        Command::Locks => {
            for name in db::list_locks(&conn, &table)? {
                println!("{name}");
            }
        }
        Command::Check { lock_name } => {
            let semaphore = build_semaphore(table, config.lock.strategy);
            let tx = conn.transaction()?;
            let mut ctx = LockContext::new("stockade-check", &tx);
            semaphore.obtain_lock(&mut ctx, &lock_name)?;
            drop(ctx);
            tx.rollback()?;
            println!("{lock_name}: ok ({})", semaphore.strategy());
        }
        Command::Hold { lock_name, secs } => {
            let semaphore = build_semaphore(table, config.lock.strategy);
            hold(&mut conn, semaphore.as_ref(), &lock_name, Duration::from_secs(secs))?;
        }
    }
    Ok(())
}

fn hold(
    conn: &mut Connection,
    semaphore: &dyn Semaphore,
    lock_name: &str,
    duration: Duration,
) -> anyhow::Result<()> {
    stockade_lock::execute_in_lock(conn, semaphore, lock_name, |_, ctx| {
        info!(lock = lock_name, owner = ctx.owner(), secs = duration.as_secs(), "holding lock");
        std::thread::sleep(duration);
        Ok::<_, anyhow::Error>(())
    })?;
    info!(lock = lock_name, "lock released");
    Ok(())
}

fn open_db(config: &StockadeConfig) -> anyhow::Result<Connection> {
    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let conn = Connection::open(db_path)?;
    // WAL lets readers proceed while a scheduler holds a row lock.
    let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        warn!(mode = %mode, "database did not switch to WAL");
    }
    conn.busy_timeout(Duration::from_millis(config.database.busy_timeout_ms))?;
    Ok(conn)
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(path = %parent.display(), "could not create database directory: {e}");
            }
        }
    }
}
