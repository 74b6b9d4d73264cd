// 📒 Change Ledger - Every entry/exit ever detected
//
// Append-only. Keyed by (date, source, ticker, kind); the UNIQUE constraint
// and INSERT OR IGNORE make the duplicate check part of the insert itself,
// so concurrent detection runs for the same date cannot double-record.

use crate::db::with_immediate_transaction;
use crate::error::Result;
use crate::model::{ChangeEvent, ChangeKind, Source};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};
use std::collections::HashMap;
use std::io::Write;

const EVENT_COLUMNS: &str = "event_id, date, source, ticker, kind, detected_at";

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<ChangeEvent> {
    Ok(ChangeEvent {
        event_id: row.get(0)?,
        date: row.get(1)?,
        source: row.get(2)?,
        ticker: row.get(3)?,
        kind: row.get(4)?,
        detected_at: row.get(5)?,
    })
}

/// Insert the event if (date, source, ticker, kind) is not yet recorded.
/// Returns false when the row already existed (duplicate suppressed).
pub(crate) fn append_event(
    conn: &Connection,
    date: NaiveDate,
    source: Source,
    ticker: &str,
    kind: ChangeKind,
) -> Result<bool> {
    let event = ChangeEvent::new(date, source, ticker, kind);

    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO change_events (event_id, date, source, ticker, kind, detected_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    let changed = stmt.execute(params![
        event.event_id,
        event.date,
        event.source,
        event.ticker,
        event.kind,
        event.detected_at,
    ])?;

    Ok(changed == 1)
}

/// Latest recorded exit per ticker, restricted to dates before `before`
pub(crate) fn last_exit_before(
    conn: &Connection,
    source: Source,
    before: NaiveDate,
) -> Result<HashMap<String, NaiveDate>> {
    let mut stmt = conn.prepare_cached(
        "SELECT ticker, MAX(date) FROM change_events
         WHERE source = ?1 AND kind = ?2 AND date < ?3
         GROUP BY ticker",
    )?;

    let exits = stmt
        .query_map(params![source, ChangeKind::Exit, before], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, NaiveDate>(1)?))
        })?
        .collect::<rusqlite::Result<HashMap<_, _>>>()?;

    Ok(exits)
}

// ============================================================================
// CHANGE LEDGER
// ============================================================================

pub struct ChangeLedger<'c> {
    conn: &'c Connection,
}

impl<'c> ChangeLedger<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        ChangeLedger { conn }
    }

    /// Record an event; a repeat of an existing key is a silent no-op
    pub fn append_event(
        &self,
        date: NaiveDate,
        source: Source,
        ticker: &str,
        kind: ChangeKind,
    ) -> Result<bool> {
        with_immediate_transaction(self.conn, |tx| append_event(tx, date, source, ticker, kind))
    }

    /// Events detected for exactly `date`, ordered by source, kind, ticker
    pub fn events_on(&self, date: NaiveDate) -> Result<Vec<ChangeEvent>> {
        let sql = format!(
            "SELECT {} FROM change_events WHERE date = ?1 ORDER BY source, kind, ticker",
            EVENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let events = stmt
            .query_map([date], event_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(events)
    }

    /// Events on or after `since`, in chronological order
    pub fn events_since(&self, since: NaiveDate) -> Result<Vec<ChangeEvent>> {
        let sql = format!(
            "SELECT {} FROM change_events WHERE date >= ?1 ORDER BY date, source, kind, ticker",
            EVENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let events = stmt
            .query_map([since], event_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(events)
    }

    /// Full timeline for one ticker on one list
    pub fn history_for(&self, source: Source, ticker: &str) -> Result<Vec<ChangeEvent>> {
        let sql = format!(
            "SELECT {} FROM change_events WHERE source = ?1 AND ticker = ?2 ORDER BY date, kind",
            EVENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let events = stmt
            .query_map(params![source, ticker], event_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(events)
    }

    pub fn event_count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM change_events", [], |row| row.get(0))?;
        Ok(count)
    }
}

// ============================================================================
// CSV EXPORT
// ============================================================================

/// Write events as CSV with a header row
pub fn write_events_csv<W: Write>(writer: W, events: &[ChangeEvent]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    wtr.write_record(["date", "source", "ticker", "kind", "event_id", "detected_at"])?;
    for event in events {
        wtr.write_record([
            event.date.to_string(),
            event.source.code().to_string(),
            event.ticker.clone(),
            event.kind.to_string(),
            event.event_id.clone(),
            event.detected_at.to_rfc3339(),
        ])?;
    }
    wtr.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_append_twice_stores_one_row() {
        let conn = open_in_memory().unwrap();
        let ledger = ChangeLedger::new(&conn);
        let day = date("2025-01-02");

        let first = ledger.append_event(day, Source::CaveatEmptor, "CCC", ChangeKind::Entry).unwrap();
        let second = ledger.append_event(day, Source::CaveatEmptor, "CCC", ChangeKind::Entry).unwrap();

        assert!(first);
        assert!(!second, "duplicate must be suppressed");
        assert_eq!(ledger.event_count().unwrap(), 1);
    }

    #[test]
    fn test_kind_and_source_are_part_of_key() {
        let conn = open_in_memory().unwrap();
        let ledger = ChangeLedger::new(&conn);
        let day = date("2025-01-02");

        ledger.append_event(day, Source::CaveatEmptor, "AAA", ChangeKind::Entry).unwrap();
        ledger.append_event(day, Source::CaveatEmptor, "AAA", ChangeKind::Exit).unwrap();
        ledger.append_event(day, Source::ExpertMarket, "AAA", ChangeKind::Entry).unwrap();

        assert_eq!(ledger.event_count().unwrap(), 3);
    }

    #[test]
    fn test_events_on_and_since() {
        let conn = open_in_memory().unwrap();
        let ledger = ChangeLedger::new(&conn);

        ledger.append_event(date("2025-01-01"), Source::CaveatEmptor, "OLD", ChangeKind::Exit).unwrap();
        ledger.append_event(date("2025-01-03"), Source::ExpertMarket, "ZZZ", ChangeKind::Entry).unwrap();
        ledger.append_event(date("2025-01-03"), Source::CaveatEmptor, "BBB", ChangeKind::Exit).unwrap();
        ledger.append_event(date("2025-01-05"), Source::CaveatEmptor, "CCC", ChangeKind::Entry).unwrap();

        let on = ledger.events_on(date("2025-01-03")).unwrap();
        assert_eq!(on.len(), 2);
        assert_eq!(on[0].source, Source::CaveatEmptor);
        assert_eq!(on[0].ticker, "BBB");
        assert_eq!(on[1].ticker, "ZZZ");

        // Inclusive lower bound
        let since = ledger.events_since(date("2025-01-03")).unwrap();
        let tickers: Vec<&str> = since.iter().map(|e| e.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["BBB", "ZZZ", "CCC"]);
    }

    #[test]
    fn test_history_for_ticker() {
        let conn = open_in_memory().unwrap();
        let ledger = ChangeLedger::new(&conn);

        ledger.append_event(date("2025-01-01"), Source::ExpertMarket, "AAA", ChangeKind::Entry).unwrap();
        ledger.append_event(date("2025-01-04"), Source::ExpertMarket, "AAA", ChangeKind::Exit).unwrap();
        ledger.append_event(date("2025-01-02"), Source::CaveatEmptor, "AAA", ChangeKind::Entry).unwrap();

        let history = ledger.history_for(Source::ExpertMarket, "AAA").unwrap();
        let kinds: Vec<ChangeKind> = history.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ChangeKind::Entry, ChangeKind::Exit]);
    }

    #[test]
    fn test_last_exit_before() {
        let conn = open_in_memory().unwrap();
        let ledger = ChangeLedger::new(&conn);

        ledger.append_event(date("2025-01-02"), Source::CaveatEmptor, "AAA", ChangeKind::Exit).unwrap();
        ledger.append_event(date("2025-01-05"), Source::CaveatEmptor, "AAA", ChangeKind::Exit).unwrap();
        ledger.append_event(date("2025-01-03"), Source::CaveatEmptor, "BBB", ChangeKind::Entry).unwrap();

        let exits = last_exit_before(&conn, Source::CaveatEmptor, date("2025-01-05")).unwrap();
        assert_eq!(exits.get("AAA"), Some(&date("2025-01-02")));
        assert!(!exits.contains_key("BBB"));
    }

    #[test]
    fn test_write_events_csv() {
        let conn = open_in_memory().unwrap();
        let ledger = ChangeLedger::new(&conn);
        ledger.append_event(date("2025-01-03"), Source::ExpertMarket, "ZZZ", ChangeKind::Entry).unwrap();

        let events = ledger.events_on(date("2025-01-03")).unwrap();
        let mut out = Vec::new();
        write_events_csv(&mut out, &events).unwrap();

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("date,source,ticker,kind,event_id,detected_at"));
        assert!(lines.next().unwrap().starts_with("2025-01-03,EM,ZZZ,entry,"));
        assert_eq!(lines.next(), None);
    }
}
