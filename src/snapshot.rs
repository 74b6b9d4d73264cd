// 📸 Snapshot Store - Durable (source, ticker, date) observations
//
// A snapshot is the complete membership set for one source on one date.
// Rows for a fixed (source, date) always form a set: the UNIQUE constraint
// plus INSERT OR IGNORE make duplicate tickers impossible at write time.

use crate::db::with_immediate_transaction;
use crate::error::Result;
use crate::model::{MembershipSet, Observation, Source};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use tracing::debug;

// ============================================================================
// STATEMENT HELPERS (run inside a caller-owned transaction)
// ============================================================================

/// Delete whatever is stored for (source, date) and insert `tickers`.
/// Callers must wrap this in a transaction for the replace to be atomic.
pub(crate) fn replace_snapshot(
    conn: &Connection,
    source: Source,
    date: NaiveDate,
    tickers: &MembershipSet,
) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM observations WHERE source = ?1 AND date = ?2",
        params![source, date],
    )?;
    let inserted = insert_tickers(conn, source, date, tickers)?;

    debug!(%source, %date, removed, inserted, "snapshot replaced");
    Ok(inserted)
}

/// Insert each ticker unless already present. Returns rows actually added.
pub(crate) fn insert_tickers(
    conn: &Connection,
    source: Source,
    date: NaiveDate,
    tickers: &MembershipSet,
) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO observations (source, ticker, date) VALUES (?1, ?2, ?3)",
    )?;

    let mut inserted = 0;
    for ticker in tickers {
        inserted += stmt.execute(params![source, ticker, date])?;
    }

    Ok(inserted)
}

pub(crate) fn members_as_of(
    conn: &Connection,
    source: Source,
    before: NaiveDate,
) -> Result<MembershipSet> {
    let mut stmt = conn.prepare_cached(
        "SELECT DISTINCT ticker FROM observations WHERE source = ?1 AND date < ?2",
    )?;

    let tickers = stmt
        .query_map(params![source, before], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<MembershipSet>>()?;

    Ok(tickers)
}

pub(crate) fn members_on(
    conn: &Connection,
    source: Source,
    date: NaiveDate,
) -> Result<MembershipSet> {
    let mut stmt =
        conn.prepare_cached("SELECT ticker FROM observations WHERE source = ?1 AND date = ?2")?;

    let tickers = stmt
        .query_map(params![source, date], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<MembershipSet>>()?;

    Ok(tickers)
}

/// Latest observation date per ticker, restricted to dates before `before`
pub(crate) fn last_seen_before(
    conn: &Connection,
    source: Source,
    before: NaiveDate,
) -> Result<HashMap<String, NaiveDate>> {
    let mut stmt = conn.prepare_cached(
        "SELECT ticker, MAX(date) FROM observations
         WHERE source = ?1 AND date < ?2
         GROUP BY ticker",
    )?;

    let seen = stmt
        .query_map(params![source, before], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, NaiveDate>(1)?))
        })?
        .collect::<rusqlite::Result<HashMap<_, _>>>()?;

    Ok(seen)
}

// ============================================================================
// SNAPSHOT STORE
// ============================================================================

pub struct SnapshotStore<'c> {
    conn: &'c Connection,
}

impl<'c> SnapshotStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        SnapshotStore { conn }
    }

    /// Replace the observations for (source, date) with `tickers`.
    ///
    /// All-or-nothing: concurrent readers see the old complete set or the
    /// new complete set, never a mix.
    pub fn record_snapshot(
        &self,
        source: Source,
        date: NaiveDate,
        tickers: &MembershipSet,
    ) -> Result<usize> {
        with_immediate_transaction(self.conn, |tx| replace_snapshot(tx, source, date, tickers))
    }

    /// Add any tickers missing for (source, date) without deleting anything.
    /// Used to fill historical gaps, where stored rows are never rewritten.
    pub fn fill_snapshot(
        &self,
        source: Source,
        date: NaiveDate,
        tickers: &MembershipSet,
    ) -> Result<usize> {
        with_immediate_transaction(self.conn, |tx| insert_tickers(tx, source, date, tickers))
    }

    /// Every ticker ever observed for `source` strictly before `before`
    pub fn members_as_of(&self, source: Source, before: NaiveDate) -> Result<MembershipSet> {
        members_as_of(self.conn, source, before)
    }

    /// Exact set recorded for (source, date); empty when nothing is recorded
    pub fn members_on(&self, source: Source, date: NaiveDate) -> Result<MembershipSet> {
        members_on(self.conn, source, date)
    }

    /// Latest sighting of every (source, ticker) observed on or after `since`
    pub fn listed_since(&self, since: NaiveDate) -> Result<Vec<Observation>> {
        let mut stmt = self.conn.prepare(
            "SELECT source, ticker, MAX(date) FROM observations
             WHERE date >= ?1
             GROUP BY source, ticker
             ORDER BY source, ticker",
        )?;

        let listed = stmt
            .query_map([since], |row| {
                Ok(Observation {
                    source: row.get(0)?,
                    ticker: row.get(1)?,
                    date: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(listed)
    }

    /// Dates with at least one observation for `source`, ascending
    pub fn recorded_dates(&self, source: Source) -> Result<Vec<NaiveDate>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT date FROM observations WHERE source = ?1 ORDER BY date",
        )?;

        let dates = stmt
            .query_map([source], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(dates)
    }

    pub fn observation_count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))?;
        Ok(count)
    }
}
