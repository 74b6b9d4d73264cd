// 🔀 Diff Engine - Entries and exits for one (source, date)
//
// previous = History Resolver, current = today's validated snapshot.
// The read, the snapshot replace and the ledger appends share a single
// IMMEDIATE transaction: a failure leaves no partial state behind.

use crate::db::with_immediate_transaction;
use crate::error::Result;
use crate::history::previous_members;
use crate::ledger::append_event;
use crate::model::{ChangeKind, ChangeSet, MembershipSet, Source};
use crate::snapshot::replace_snapshot;
use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::info;

/// Pure set algebra: entered = current − previous, exited = previous − current.
/// BTreeSet iteration order makes both lists sorted ascending.
pub fn diff_sets(previous: &MembershipSet, current: &MembershipSet) -> ChangeSet {
    ChangeSet {
        entered: current.difference(previous).cloned().collect(),
        exited: previous.difference(current).cloned().collect(),
    }
}

/// Detection body, for callers that already hold a transaction
pub(crate) fn detect_in(
    conn: &Connection,
    source: Source,
    date: NaiveDate,
    current: &MembershipSet,
) -> Result<ChangeSet> {
    let previous = previous_members(conn, source, date)?;
    let computed = diff_sets(&previous, current);

    replace_snapshot(conn, source, date, current)?;

    // Only what the ledger did not already hold is reported back
    let mut recorded = ChangeSet::default();
    for ticker in &computed.exited {
        if append_event(conn, date, source, ticker, ChangeKind::Exit)? {
            recorded.exited.push(ticker.clone());
        }
    }
    for ticker in &computed.entered {
        if append_event(conn, date, source, ticker, ChangeKind::Entry)? {
            recorded.entered.push(ticker.clone());
        }
    }

    Ok(recorded)
}

pub struct DiffEngine<'c> {
    conn: &'c Connection,
}

impl<'c> DiffEngine<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        DiffEngine { conn }
    }

    /// Diff `current` against history, persist it, and record the changes.
    ///
    /// `current` must be a genuine snapshot. An empty set is taken at face
    /// value and will exit every previous member, so a failed fetch must
    /// never be passed in as an empty set.
    ///
    /// Returns the entries and exits newly added to the ledger by this call;
    /// re-running the same date with the same input returns empty lists.
    pub fn detect_changes(
        &self,
        source: Source,
        date: NaiveDate,
        current: &MembershipSet,
    ) -> Result<ChangeSet> {
        let changes =
            with_immediate_transaction(self.conn, |tx| detect_in(tx, source, date, current))?;

        info!(
            %source,
            %date,
            members = current.len(),
            entered = changes.entered.len(),
            exited = changes.exited.len(),
            "detection complete"
        );

        Ok(changes)
    }
}
