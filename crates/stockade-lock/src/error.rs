use thiserror::Error;

/// Boxed driver failure. Keeps driver error types out of the public surface.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Broad category of a [`LockError`], so callers can branch without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockErrorKind {
    /// Schema or configuration defect (missing lock row, bad identifier).
    /// Retrying will not help.
    Configuration,
    /// The engine gave up waiting for the row lock (busy, lock timeout, deadlock abort).
    /// The caller may retry in a fresh transaction.
    Transient,
    /// Any other statement or connectivity failure.
    Statement,
}

/// Failure reported by a [`LockConnection`](crate::connection::LockConnection).
///
/// The adapter decides whether the engine failure means "gave up waiting for
/// a lock" or anything else.
#[derive(Debug, Error)]
pub enum StatementError {
    #[error("lock wait failed: {0}")]
    Transient(#[source] BoxError),

    #[error("statement failed: {0}")]
    Failed(#[source] BoxError),
}

impl StatementError {
    pub fn transient(err: impl Into<BoxError>) -> Self {
        StatementError::Transient(err.into())
    }

    pub fn failed(err: impl Into<BoxError>) -> Self {
        StatementError::Failed(err.into())
    }
}

/// The single error surface of every semaphore strategy.
#[derive(Debug, Error)]
pub enum LockError {
    /// No lock row exists for this name. A provisioning bug, not contention.
    #[error("no row for lock '{lock_name}' in {table} (scheduler '{sched_name}')")]
    MissingRow {
        lock_name: String,
        table: String,
        sched_name: String,
    },

    /// The lock name cannot be used at all.
    #[error("invalid lock name '{lock_name}': {reason}")]
    InvalidLockName { lock_name: String, reason: String },

    /// The lock table configuration is unusable.
    #[error("invalid lock table configuration: {0}")]
    InvalidConfig(String),

    #[error("gave up waiting for lock '{lock_name}': {source}")]
    Contention {
        lock_name: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to obtain lock '{lock_name}': {source}")]
    Statement {
        lock_name: String,
        #[source]
        source: BoxError,
    },

    /// Creating, provisioning or listing the lock table failed.
    #[error("lock table {table}: {source}")]
    Table {
        table: String,
        #[source]
        source: StatementError,
    },
}

impl LockError {
    /// Wrap a connection failure for `lock_name`, keeping the original cause as `source()`.
    pub(crate) fn from_statement(lock_name: &str, err: StatementError) -> Self {
        match err {
            StatementError::Transient(source) => LockError::Contention {
                lock_name: lock_name.to_string(),
                source,
            },
            StatementError::Failed(source) => LockError::Statement {
                lock_name: lock_name.to_string(),
                source,
            },
        }
    }

    pub fn kind(&self) -> LockErrorKind {
        match self {
            LockError::MissingRow { .. }
            | LockError::InvalidLockName { .. }
            | LockError::InvalidConfig(_) => LockErrorKind::Configuration,
            LockError::Contention { .. }
            | LockError::Table {
                source: StatementError::Transient(_),
                ..
            } => LockErrorKind::Transient,
            LockError::Statement { .. }
            | LockError::Table {
                source: StatementError::Failed(_),
                ..
            } => LockErrorKind::Statement,
        }
    }

    /// The lock this error is about, if it concerns a specific lock.
    pub fn lock_name(&self) -> Option<&str> {
        match self {
            LockError::MissingRow { lock_name, .. }
            | LockError::InvalidLockName { lock_name, .. }
            | LockError::Contention { lock_name, .. }
            | LockError::Statement { lock_name, .. } => Some(lock_name),
            LockError::InvalidConfig(_) | LockError::Table { .. } => None,
        }
    }

    /// True when a new transaction attempt might succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == LockErrorKind::Transient
    }
}

pub type Result<T> = std::result::Result<T, LockError>;
