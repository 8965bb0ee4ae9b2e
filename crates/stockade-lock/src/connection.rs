use rusqlite::{Connection, ErrorCode, ToSql, Transaction};

use crate::error::StatementError;

/// The statements a semaphore needs from the caller's connection.
///
/// The caller owns the connection and its transaction: implementations must
/// never begin, commit or roll back. Parameters are `(":name", value)` pairs and
/// are always bound, never spliced into the SQL.
pub trait LockConnection {
    /// Execute a statement and return the number of affected rows.
    fn execute_non_query(
        &self,
        sql: &str,
        params: &[(&str, &str)],
    ) -> Result<usize, StatementError>;

    /// Run a query and return how many rows it produced.
    fn query_row_count(&self, sql: &str, params: &[(&str, &str)])
        -> Result<usize, StatementError>;
}

impl LockConnection for Connection {
    fn execute_non_query(
        &self,
        sql: &str,
        params: &[(&str, &str)],
    ) -> Result<usize, StatementError> {
        // The cached statement handle is returned to the cache on every exit path.
        let mut stmt = self.prepare_cached(sql).map_err(classify)?;
        let named = to_named(params);
        stmt.execute(named.as_slice()).map_err(classify)
    }

    fn query_row_count(
        &self,
        sql: &str,
        params: &[(&str, &str)],
    ) -> Result<usize, StatementError> {
        let mut stmt = self.prepare_cached(sql).map_err(classify)?;
        let named = to_named(params);
        let mut rows = stmt.query(named.as_slice()).map_err(classify)?;
        let mut count = 0;
        while rows.next().map_err(classify)?.is_some() {
            count += 1;
        }
        Ok(count)
    }
}

impl LockConnection for Transaction<'_> {
    fn execute_non_query(
        &self,
        sql: &str,
        params: &[(&str, &str)],
    ) -> Result<usize, StatementError> {
        LockConnection::execute_non_query(&**self, sql, params)
    }

    fn query_row_count(
        &self,
        sql: &str,
        params: &[(&str, &str)],
    ) -> Result<usize, StatementError> {
        LockConnection::query_row_count(&**self, sql, params)
    }
}

fn to_named<'a>(params: &'a [(&'a str, &'a str)]) -> Vec<(&'a str, &'a dyn ToSql)> {
    params
        .iter()
        .map(|(name, value)| (*name, value as &dyn ToSql))
        .collect()
}

/// Busy/locked means the busy timeout ran out waiting on another writer.
pub(crate) fn classify(err: rusqlite::Error) -> StatementError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
            StatementError::transient(err)
        }
        _ => StatementError::failed(err),
    }
}
