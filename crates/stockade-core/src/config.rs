use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_INSTANCE_NAME: &str = "StockadeScheduler";
pub const DEFAULT_TABLE_PREFIX: &str = "SCHED_";
pub const DEFAULT_LOCK_TABLE: &str = "LOCKS";
pub const DEFAULT_LOCK_COLUMN: &str = "LOCK_NAME";
pub const DEFAULT_SCHED_COLUMN: &str = "SCHED_NAME";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 30_000;

/// Guards trigger acquisition and firing across the cluster.
pub const TRIGGER_ACCESS: &str = "TRIGGER_ACCESS";
/// Guards scheduler state check-ins and failed-instance recovery.
pub const STATE_ACCESS: &str = "STATE_ACCESS";

/// Top-level config (stockade.toml + STOCKADE_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StockadeConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub lock: LockConfig,
}

/// Identity of this scheduler within its cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Every process sharing a lock table under the same name forms one cluster.
    #[serde(default = "default_instance_name")]
    pub instance_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// How long a statement waits on a locked row before failing.
    /// This is the only lock-wait bound; strategies never retry.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// Which statement shape is used to take the row lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStrategy {
    /// Self-assignment `UPDATE`; for engines without a reliable `SELECT ... FOR UPDATE`.
    #[default]
    UpdateRow,
    /// Locking read via `SELECT ... FOR UPDATE`.
    SelectForUpdate,
    /// Guarded insert of the lock row, then the row update.
    InsertIfAbsent,
}

impl std::fmt::Display for LockStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LockStrategy::UpdateRow => "update_row",
            LockStrategy::SelectForUpdate => "select_for_update",
            LockStrategy::InsertIfAbsent => "insert_if_absent",
        };
        write!(f, "{s}")
    }
}

/// Lock table naming and statement overrides.
///
/// Statement templates may reference `{table}`, `{lock_column}` and
/// `{sched_column}`, and the bind parameters `:sched_name` and `:lock_name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default)]
    pub strategy: LockStrategy,
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,
    #[serde(default = "default_lock_table")]
    pub table_name: String,
    #[serde(default = "default_lock_column")]
    pub lock_column: String,
    #[serde(default = "default_sched_column")]
    pub sched_column: String,
    /// Replaces the strategy's locking statement for engines needing other syntax.
    #[serde(default)]
    pub lock_sql: Option<String>,
    /// Replaces the guarded insert used by `insert_if_absent`.
    #[serde(default)]
    pub insert_sql: Option<String>,
    /// Lock rows provisioned by `stockade init`.
    #[serde(default = "default_lock_names")]
    pub lock_names: Vec<String>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            strategy: LockStrategy::default(),
            table_prefix: default_table_prefix(),
            table_name: default_lock_table(),
            lock_column: default_lock_column(),
            sched_column: default_sched_column(),
            lock_sql: None,
            insert_sql: None,
            lock_names: default_lock_names(),
        }
    }
}

fn default_instance_name() -> String {
    DEFAULT_INSTANCE_NAME.to_string()
}
fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}
fn default_table_prefix() -> String {
    DEFAULT_TABLE_PREFIX.to_string()
}
fn default_lock_table() -> String {
    DEFAULT_LOCK_TABLE.to_string()
}
fn default_lock_column() -> String {
    DEFAULT_LOCK_COLUMN.to_string()
}
fn default_sched_column() -> String {
    DEFAULT_SCHED_COLUMN.to_string()
}
fn default_lock_names() -> Vec<String> {
    vec![TRIGGER_ACCESS.to_string(), STATE_ACCESS.to_string()]
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.stockade/stockade.db", home)
}

impl StockadeConfig {
    /// Load config from a TOML file with STOCKADE_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g. `STOCKADE_LOCK__TABLE_PREFIX`,
    /// so single underscores inside field names survive.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed("STOCKADE_").split("__")),
        )
    }

    /// Extract config from an already assembled figment.
    pub fn from_figment(figment: Figment) -> crate::error::Result<Self> {
        figment
            .extract()
            .map_err(|e| crate::error::StockadeError::Config(e.to_string()))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.stockade/stockade.toml", home)
}
