// 🗄️ Storage Layer - SQLite schema, connections, transactions
// Uniqueness is enforced by the schema, never by check-then-insert in code.

use crate::error::Result;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// How long a writer waits on a lock held by another process
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn setup_database(conn: &Connection) -> Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Observations: "ticker was on source's list on date"
    // id is monotonic, so it doubles as insertion order
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS observations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source TEXT NOT NULL,
            ticker TEXT NOT NULL,
            date TEXT NOT NULL,
            recorded_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (source, ticker, date)
        )",
        [],
    )?;

    // ==========================================================================
    // Change ledger (append-only)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS change_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            date TEXT NOT NULL,
            source TEXT NOT NULL,
            ticker TEXT NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('entry', 'exit')),
            detected_at TEXT NOT NULL,
            UNIQUE (date, source, ticker, kind)
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_observations_source_date ON observations(source, date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_observations_date ON observations(date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_date ON change_events(date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_source_ticker ON change_events(source, ticker, kind)",
        [],
    )?;

    Ok(())
}

/// Open (creating if needed) a database file and make sure the schema exists
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    setup_database(&conn)?;
    debug!(path = %path.display(), "database ready");
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    setup_database(&conn)?;
    Ok(conn)
}

/// Run `f` inside an IMMEDIATE transaction.
///
/// The write lock is taken up front, so a second writer for the same
/// database blocks (up to the busy timeout) instead of interleaving.
/// If `f` fails the transaction is rolled back when it is dropped.
pub fn with_immediate_transaction<T, F>(conn: &Connection, f: F) -> Result<T>
where
    F: FnOnce(&Transaction<'_>) -> Result<T>,
{
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    }

    #[test]
    fn test_setup_creates_tables() {
        let conn = open_in_memory().unwrap();

        assert!(table_exists(&conn, "observations"));
        assert!(table_exists(&conn, "change_events"));

        // Running setup twice is harmless
        setup_database(&conn).unwrap();
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let conn = open_in_memory().unwrap();

        let result: Result<()> = with_immediate_transaction(&conn, |tx| {
            tx.execute(
                "INSERT INTO observations (source, ticker, date) VALUES ('CE', 'AAA', '2025-01-02')",
                [],
            )?;
            Err(MonitorError::Config("boom".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0, "partial write must not survive a failed transaction");
    }

    #[test]
    fn test_unique_constraint_on_observations() {
        let conn = open_in_memory().unwrap();

        conn.execute(
            "INSERT INTO observations (source, ticker, date) VALUES ('CE', 'AAA', '2025-01-02')",
            [],
        )
        .unwrap();
        let dup = conn.execute(
            "INSERT INTO observations (source, ticker, date) VALUES ('CE', 'AAA', '2025-01-02')",
            [],
        );

        match dup {
            Err(rusqlite::Error::SqliteFailure(err, _)) => {
                assert_eq!(err.code, rusqlite::ErrorCode::ConstraintViolation)
            }
            other => panic!("expected constraint violation, got {:?}", other),
        }
    }
}
