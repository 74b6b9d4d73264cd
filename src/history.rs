// 🕰️ History Resolver - What counts as "previously listed"
//
// Previous membership is the union of every earlier observation, not just
// yesterday's list. A ticker stays "previously present" until the ledger
// holds an Exit for it that is newer than its last sighting. Detection and
// backfill both go through here so the policy is applied in one place.

use crate::error::Result;
use crate::ledger::last_exit_before;
use crate::model::{MembershipSet, Source};
use crate::snapshot::last_seen_before;
use chrono::NaiveDate;
use rusqlite::Connection;

/// Previous membership for (source, date), read through `conn`.
/// Pass a transaction to get a view consistent with writes made in it.
pub(crate) fn previous_members(
    conn: &Connection,
    source: Source,
    date: NaiveDate,
) -> Result<MembershipSet> {
    let last_seen = last_seen_before(conn, source, date)?;
    let last_exit = last_exit_before(conn, source, date)?;

    let previous = last_seen
        .into_iter()
        .filter(|(ticker, seen)| match last_exit.get(ticker) {
            // Exit recorded after the last sighting: retired from history
            Some(exited) => exited <= seen,
            None => true,
        })
        .map(|(ticker, _)| ticker)
        .collect();

    Ok(previous)
}

pub struct HistoryResolver<'c> {
    conn: &'c Connection,
}

impl<'c> HistoryResolver<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        HistoryResolver { conn }
    }

    pub fn previous_members(&self, source: Source, date: NaiveDate) -> Result<MembershipSet> {
        previous_members(self.conn, source, date)
    }
}
