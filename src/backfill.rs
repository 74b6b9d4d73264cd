// 🧱 Backfill Orchestrator - Repair gaps in recorded history
//
// Dates are always processed oldest first, so every membership query made
// mid-run sees a consistent partial history. A failed date is logged and
// reported, never fatal to the run.

use crate::diff::DiffEngine;
use crate::error::{MonitorError, Result};
use crate::model::{ChangeSet, MembershipSet, Source};
use crate::snapshot::SnapshotStore;
use chrono::{Days, NaiveDate};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ============================================================================
// FETCHER SEAM
// ============================================================================

/// MembershipFetcher - Supplies the authoritative list for (source, date)
///
/// Retrieval (FTP, HTTP, local files) lives behind this trait. Failure must
/// be reported as `MonitorError::FetchFailed`, never as an empty set.
pub trait MembershipFetcher {
    fn fetch_membership(&self, source: Source, date: NaiveDate) -> Result<MembershipSet>;
}

impl<F> MembershipFetcher for F
where
    F: Fn(Source, NaiveDate) -> Result<MembershipSet>,
{
    fn fetch_membership(&self, source: Source, date: NaiveDate) -> Result<MembershipSet> {
        self(source, date)
    }
}

// ============================================================================
// MODE & REPORT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackfillMode {
    /// Fill in missing observations only; no change events
    ObservationsOnly,

    /// Run full detection for every date, recording events as it goes
    Redetect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDate {
    pub date: NaiveDate,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillReport {
    pub source: Source,
    pub mode: BackfillMode,

    /// Dates processed successfully, ascending
    pub succeeded: Vec<NaiveDate>,

    /// Dates that could not be processed, ascending
    pub failed: Vec<FailedDate>,

    /// Observation rows added (observations-only mode)
    pub observations_added: usize,

    /// Changes recorded per date (redetect mode, non-empty only)
    pub changes: Vec<(NaiveDate, ChangeSet)>,
}

impl BackfillReport {
    fn new(source: Source, mode: BackfillMode) -> Self {
        BackfillReport {
            source,
            mode,
            succeeded: Vec::new(),
            failed: Vec::new(),
            observations_added: 0,
            changes: Vec::new(),
        }
    }

    pub fn failed_dates(&self) -> Vec<NaiveDate> {
        self.failed.iter().map(|f| f.date).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} dates ok, {} failed, {} observations added, {} dates with changes",
            self.source,
            self.succeeded.len(),
            self.failed.len(),
            self.observations_added,
            self.changes.len()
        )
    }
}

/// `date` minus `days`, or `WindowOutOfRange` when that falls off the calendar
pub fn days_before(date: NaiveDate, days: u32) -> Result<NaiveDate> {
    date.checked_sub_days(Days::new(u64::from(days)))
        .ok_or(MonitorError::WindowOutOfRange { date, days })
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

pub struct BackfillOrchestrator<'a, F: MembershipFetcher + ?Sized> {
    conn: &'a Connection,
    fetcher: &'a F,
    mode: BackfillMode,
}

impl<'a, F: MembershipFetcher + ?Sized> BackfillOrchestrator<'a, F> {
    /// Observations-only orchestrator (the default)
    pub fn new(conn: &'a Connection, fetcher: &'a F) -> Self {
        BackfillOrchestrator {
            conn,
            fetcher,
            mode: BackfillMode::ObservationsOnly,
        }
    }

    pub fn with_mode(mut self, mode: BackfillMode) -> Self {
        self.mode = mode;
        self
    }

    /// Backfill every date in [start, end], inclusive, in order
    pub fn backfill(
        &self,
        source: Source,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BackfillReport> {
        if start > end {
            return Err(MonitorError::InvalidRange { start, end });
        }

        let dates: Vec<NaiveDate> = start.iter_days().take_while(|d| *d <= end).collect();
        Ok(self.run(source, &dates))
    }

    /// Backfill arbitrary dates; they are sorted and de-duplicated first
    pub fn backfill_dates(&self, source: Source, dates: &[NaiveDate]) -> BackfillReport {
        let mut ordered = dates.to_vec();
        ordered.sort();
        ordered.dedup();
        self.run(source, &ordered)
    }

    /// Backfill the `days` dates before `today` (today itself excluded)
    pub fn backfill_trailing(
        &self,
        source: Source,
        today: NaiveDate,
        days: u32,
    ) -> Result<BackfillReport> {
        let start = days_before(today, days)?;
        let dates: Vec<NaiveDate> = start.iter_days().take(days as usize).collect();
        Ok(self.run(source, &dates))
    }

    fn run(&self, source: Source, dates: &[NaiveDate]) -> BackfillReport {
        let mut report = BackfillReport::new(source, self.mode);

        for &date in dates {
            match self.process_date(source, date, &mut report) {
                Ok(()) => report.succeeded.push(date),
                Err(e) => {
                    warn!(%source, %date, error = %e, "backfill date failed, continuing");
                    report.failed.push(FailedDate {
                        date,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            %source,
            mode = ?self.mode,
            ok = report.succeeded.len(),
            failed = report.failed.len(),
            "backfill finished"
        );

        report
    }

    fn process_date(&self, source: Source, date: NaiveDate, report: &mut BackfillReport) -> Result<()> {
        let tickers = self.fetcher.fetch_membership(source, date)?;

        match self.mode {
            BackfillMode::ObservationsOnly => {
                let added = SnapshotStore::new(self.conn).fill_snapshot(source, date, &tickers)?;
                report.observations_added += added;
            }
            BackfillMode::Redetect => {
                let changes = DiffEngine::new(self.conn).detect_changes(source, date, &tickers)?;
                if !changes.is_empty() {
                    report.changes.push((date, changes));
                }
            }
        }

        Ok(())
    }
}
