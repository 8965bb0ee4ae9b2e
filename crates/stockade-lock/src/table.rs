//! Lock table naming and SQL statement templates.
//!
//! Every strategy derives its SQL from one [`LockTable`], so the same code
//! runs against arbitrarily prefixed schemas. Identifiers are interpolated into
//! SQL text and are therefore validated; values are always bound.

use stockade_core::config::{
    LockConfig, DEFAULT_LOCK_COLUMN, DEFAULT_LOCK_TABLE, DEFAULT_SCHED_COLUMN,
    DEFAULT_TABLE_PREFIX,
};

use crate::error::{LockError, Result};

/// Bind parameter carrying the scheduler instance name.
pub const SCHED_NAME_PARAM: &str = ":sched_name";
/// Bind parameter carrying the lock name.
pub const LOCK_NAME_PARAM: &str = ":lock_name";

pub const UPDATE_LOCK_ROW_SQL: &str = "UPDATE {table} SET {lock_column} = {lock_column} \
     WHERE {sched_column} = :sched_name AND {lock_column} = :lock_name";

pub const SELECT_FOR_UPDATE_SQL: &str = "SELECT {lock_column} FROM {table} \
     WHERE {sched_column} = :sched_name AND {lock_column} = :lock_name FOR UPDATE";

pub const INSERT_IF_ABSENT_SQL: &str = "INSERT INTO {table} ({sched_column}, {lock_column}) \
     SELECT :sched_name, :lock_name WHERE NOT EXISTS \
     (SELECT 1 FROM {table} WHERE {sched_column} = :sched_name AND {lock_column} = :lock_name)";

/// Scoped view of the lock table for one scheduler instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTable {
    sched_name: String,
    table_prefix: String,
    table_name: String,
    lock_column: String,
    sched_column: String,
    lock_sql: Option<String>,
    insert_sql: Option<String>,
}

impl LockTable {
    /// Default naming (`SCHED_LOCKS`, `SCHED_NAME`, `LOCK_NAME`) for `sched_name`.
    pub fn new(sched_name: impl Into<String>) -> Self {
        Self {
            sched_name: sched_name.into(),
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
            table_name: DEFAULT_LOCK_TABLE.to_string(),
            lock_column: DEFAULT_LOCK_COLUMN.to_string(),
            sched_column: DEFAULT_SCHED_COLUMN.to_string(),
            lock_sql: None,
            insert_sql: None,
        }
    }

    /// Build from the `[lock]` config section, validating every identifier.
    pub fn from_config(sched_name: impl Into<String>, config: &LockConfig) -> Result<Self> {
        let table = Self {
            sched_name: sched_name.into(),
            table_prefix: config.table_prefix.clone(),
            table_name: config.table_name.clone(),
            lock_column: config.lock_column.clone(),
            sched_column: config.sched_column.clone(),
            lock_sql: config.lock_sql.clone(),
            insert_sql: config.insert_sql.clone(),
        };
        table.validate()?;
        Ok(table)
    }

    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }

    pub fn with_lock_column(mut self, column: impl Into<String>) -> Self {
        self.lock_column = column.into();
        self
    }

    pub fn with_sched_column(mut self, column: impl Into<String>) -> Self {
        self.sched_column = column.into();
        self
    }

    /// Override the locking statement template for engines needing other syntax.
    pub fn with_lock_sql(mut self, template: impl Into<String>) -> Self {
        self.lock_sql = Some(template.into());
        self
    }

    /// Override the guarded insert template used by the insert-if-absent strategy.
    pub fn with_insert_sql(mut self, template: impl Into<String>) -> Self {
        self.insert_sql = Some(template.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sched_name.trim().is_empty() {
            return Err(LockError::InvalidConfig(
                "scheduler instance name must not be empty".to_string(),
            ));
        }
        // An empty prefix is allowed; it is validated as part of the full name.
        validate_identifier("table name", &self.qualified_name())?;
        validate_identifier("lock column", &self.lock_column)?;
        validate_identifier("scheduler column", &self.sched_column)?;
        Ok(())
    }

    pub fn sched_name(&self) -> &str {
        &self.sched_name
    }

    /// Prefixed table name, e.g. `SCHED_LOCKS`.
    pub fn qualified_name(&self) -> String {
        format!("{}{}", self.table_prefix, self.table_name)
    }

    pub fn lock_column(&self) -> &str {
        &self.lock_column
    }

    pub fn sched_column(&self) -> &str {
        &self.sched_column
    }

    /// Locking statement, falling back to `default_template` when not overridden.
    pub fn lock_statement(&self, default_template: &str) -> LockStatement {
        self.render(self.lock_sql.as_deref().unwrap_or(default_template))
    }

    pub fn insert_statement(&self) -> LockStatement {
        self.render(self.insert_sql.as_deref().unwrap_or(INSERT_IF_ABSENT_SQL))
    }

    /// Substitute the table and column placeholders of `template`.
    pub fn render(&self, template: &str) -> LockStatement {
        let sql = template
            .replace("{table}", &self.qualified_name())
            .replace("{lock_column}", &self.lock_column)
            .replace("{sched_column}", &self.sched_column);
        LockStatement { sql }
    }
}

/// A rendered statement whose only variable parts are the two bind parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockStatement {
    sql: String,
}

impl LockStatement {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Named parameters for this statement.
    ///
    /// Only parameters whose placeholder appears in the SQL are returned, so an
    /// override that is not scoped by scheduler name still binds cleanly.
    pub fn params<'a>(&self, sched_name: &'a str, lock_name: &'a str) -> Vec<(&'static str, &'a str)> {
        [(SCHED_NAME_PARAM, sched_name), (LOCK_NAME_PARAM, lock_name)]
            .into_iter()
            .filter(|(param, _)| self.sql.contains(param))
            .collect()
    }
}

fn validate_identifier(what: &str, ident: &str) -> Result<()> {
    let mut chars = ident.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(LockError::InvalidConfig(format!(
            "{what} '{ident}' is not a plain SQL identifier"
        )))
    }
}

/// Reject lock names that could never match a provisioned row.
pub(crate) fn validate_lock_name(lock_name: &str) -> Result<()> {
    if lock_name.trim().is_empty() {
        return Err(LockError::InvalidLockName {
            lock_name: lock_name.to_string(),
            reason: "lock name must not be empty".to_string(),
        });
    }
    Ok(())
}
