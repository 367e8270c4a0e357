//! SQLite driver over [`rusqlite`].
//!
//! One connection behind a mutex: the lock is the per-query connection
//! acquisition and is released deterministically on every path, including
//! errors. A supplied cancellation token is wired to SQLite's interrupt
//! handle for the duration of the statement.

use std::path::Path;
use std::sync::Mutex;

use crate::dialect::Dialect;
use crate::engine::{CancelToken, Executor};
use crate::error::{Error, Result};
use crate::materialize::RowSet;
use crate::value::SqlValue;

pub struct RusqliteExecutor {
    conn: Mutex<::rusqlite::Connection>,
}

impl RusqliteExecutor {
    pub fn new(conn: ::rusqlite::Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(::rusqlite::Connection::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(::rusqlite::Connection::open_in_memory()?))
    }

    /// Runs arbitrary statements outside the query path (seeding, pragmas).
    pub fn batch(&self, sql: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ::rusqlite::Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Execution("connection lock poisoned".into()))
    }
}

impl Executor for RusqliteExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::SQLite
    }

    fn execute(
        &self,
        sql: &str,
        params: &[SqlValue],
        cancel: Option<&CancelToken>,
    ) -> Result<RowSet> {
        if let Some(token) = cancel
            && token.is_cancelled()
        {
            return Err(Error::Cancelled);
        }

        let conn = self.lock()?;

        if let Some(token) = cancel {
            let handle = conn.get_interrupt_handle();
            token.set_abort_hook(Box::new(move || handle.interrupt()));
        }

        let result = run_statement(&conn, sql, params);

        if let Some(token) = cancel {
            token.clear_abort_hook();
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }
        }

        result
    }
}

fn run_statement(conn: &::rusqlite::Connection, sql: &str, params: &[SqlValue]) -> Result<RowSet> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let mut out = Vec::new();
    let mut rows = stmt.query(::rusqlite::params_from_iter(params.iter()))?;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(read_value(row.get_ref(i)?));
        }
        out.push(values);
    }

    Ok(RowSet { columns, rows: out })
}

fn read_value(value: ::rusqlite::types::ValueRef<'_>) -> SqlValue {
    use ::rusqlite::types::ValueRef;
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Int(i),
        ValueRef::Real(x) => SqlValue::Float(x),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            SqlValue::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

impl ::rusqlite::ToSql for SqlValue {
    fn to_sql(&self) -> ::rusqlite::Result<::rusqlite::types::ToSqlOutput<'_>> {
        use ::rusqlite::types::{ToSqlOutput, Value, ValueRef};
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Int(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            SqlValue::Float(x) => ToSqlOutput::Owned(Value::Real(*x)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Bool(b) => ToSqlOutput::Owned(Value::Integer(i64::from(*b))),
            SqlValue::Decimal(d) => ToSqlOutput::Owned(Value::Text(d.to_string())),
            SqlValue::Datetime(dt) => ToSqlOutput::Owned(Value::Text(dt.to_rfc3339())),
        })
    }
}
