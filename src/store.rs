//! SQLite-backed store shared by every ledger component.
//!
//! All SQL lives in the component modules, but every statement runs through
//! [`Ledger::read`] or [`Ledger::write`]. Writes are `BEGIN IMMEDIATE`
//! transactions: they either commit as a whole or roll back on the first
//! error, and the write lock is taken before anything is read, so a
//! read-modify-write (such as a loan balance update) cannot lose updates.

use crate::config::LedgerConfig;
use crate::decimal::Decimal4;
use crate::error::{LedgerError, Result};
use log::{debug, error, warn};
use rusqlite::{Connection, Params, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = include_str!("schema.sql");

/// Handle to a cooperative's ledger.
///
/// Cheap to share behind an `Arc`; the connection is guarded by a mutex so
/// the handle is `Send + Sync`.
pub struct Ledger {
    conn: Mutex<Connection>,

    /// `None` for in-memory ledgers.
    path: Option<PathBuf>,

    config: LedgerConfig,
}

impl Ledger {
    /// Opens (creating if needed) the ledger stored at `path`.
    pub fn open(path: impl AsRef<Path>, config: LedgerConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Self::connect(&path, &config)?;
        debug!("Opened ledger at {}", path.display());

        Ok(Ledger {
            conn: Mutex::new(conn),
            path: Some(path),
            config,
        })
    }

    /// Opens a private in-memory ledger. Nothing survives the handle.
    pub fn in_memory(config: LedgerConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::prepare(&conn, &config)?;

        Ok(Ledger {
            conn: Mutex::new(conn),
            path: None,
            config,
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn connect(path: &Path, config: &LedgerConfig) -> Result<Connection> {
        let conn = Connection::open(path)?;
        Self::prepare(&conn, config)?;
        Ok(conn)
    }

    fn prepare(conn: &Connection, config: &LedgerConfig) -> Result<()> {
        conn.busy_timeout(config.busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Locks the connection.
    ///
    /// A panic while the lock was held drops any open transaction, which
    /// rolls it back, so a poisoned lock still guards a consistent
    /// connection and is recovered.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            warn!("Recovering connection lock poisoned by a panicked operation");
            poisoned.into_inner()
        })
    }

    /// Runs a read-only query against the committed state.
    pub(crate) fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock();
        f(&conn).map_err(|e| {
            if e.is_retryable() {
                error!("Read failed: {}", e);
            }
            e
        })
    }

    /// Runs `f` inside one immediate transaction.
    ///
    /// If the database stays locked past the busy timeout, the whole
    /// transaction is retried up to `max_attempts` times. Any other error
    /// rolls back and is returned unchanged.
    pub(crate) fn write<T, F>(&self, op: &str, f: F) -> Result<T>
    where
        F: Fn(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.lock();
        let mut attempt = 1;

        loop {
            match Self::run_transaction(&mut conn, &f) {
                Ok(value) => return Ok(value),
                Err(LedgerError::Busy(msg)) if attempt < self.config.max_attempts => {
                    warn!(
                        "{}: database busy on attempt {}/{} ({}), retrying",
                        op, attempt, self.config.max_attempts, msg
                    );
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        error!("{}: {}", op, e);
                    } else {
                        debug!("{}: rejected: {}", op, e);
                    }
                    return Err(e);
                }
            }
        }
    }

    fn run_transaction<T, F>(conn: &mut Connection, f: &F) -> Result<T>
    where
        F: Fn(&Transaction<'_>) -> Result<T>,
    {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Number of rows in `table` matching `column = id`. Used by tests to
    /// check cascades.
    #[cfg(test)]
    pub(crate) fn count_rows(&self, table: &str, column: &str, id: i64) -> i64 {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE {} = ?1", table, column),
            [id],
            |row| row.get(0),
        )
        .unwrap()
    }
}

/// Sums the single `Decimal4` column selected by `sql`. Zero when no rows match.
pub(crate) fn sum_decimals<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Decimal4> {
    let mut stmt = conn.prepare_cached(sql)?;
    let mut total = Decimal4::ZERO;
    let mut rows = stmt.query(params)?;
    while let Some(row) = rows.next()? {
        let value = row.get::<_, Decimal4>(0)?;
        total = total.checked_add(value).ok_or_else(|| {
            LedgerError::invalid(format!("total exceeds the amount range after {}", total))
        })?;
    }
    Ok(total)
}
