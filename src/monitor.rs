// 🛰️ Daily Monitor - Backfill the trailing window, then track today
//
// 1. Backfill the previous N days for both lists (observations only)
// 2. Fetch today's lists; a failed fetch skips that list for today
// 3. Detect and record changes
// 4. Hand the new changes to the alert dispatcher

use crate::alert::{AlertDispatcher, AlertSink, DispatchOutcome};
use crate::backfill::{BackfillOrchestrator, BackfillReport, MembershipFetcher};
use crate::diff::DiffEngine;
use crate::error::Result;
use crate::model::{ChangeSet, Source};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceChanges {
    pub source: Source,
    pub changes: ChangeSet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedSource {
    pub source: Source,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyReport {
    pub date: NaiveDate,
    pub backfill: Vec<BackfillReport>,
    pub changes: Vec<SourceChanges>,
    /// Lists whose fetch failed today; nothing was recorded for them
    pub skipped: Vec<SkippedSource>,
    pub alerts: DispatchOutcome,
}

impl DailyReport {
    pub fn changes_for(&self, source: Source) -> Option<&ChangeSet> {
        self.changes
            .iter()
            .find(|c| c.source == source)
            .map(|c| &c.changes)
    }

    pub fn has_failures(&self) -> bool {
        !self.skipped.is_empty() || self.backfill.iter().any(|b| !b.is_complete())
    }
}

pub struct Monitor<'a, F: MembershipFetcher + ?Sized, S: AlertSink> {
    conn: &'a Connection,
    fetcher: &'a F,
    dispatcher: &'a AlertDispatcher<S>,
    backfill_days: u32,
}

impl<'a, F: MembershipFetcher + ?Sized, S: AlertSink> Monitor<'a, F, S> {
    pub fn new(conn: &'a Connection, fetcher: &'a F, dispatcher: &'a AlertDispatcher<S>) -> Self {
        Monitor {
            conn,
            fetcher,
            dispatcher,
            backfill_days: 7,
        }
    }

    pub fn with_backfill_days(mut self, days: u32) -> Self {
        self.backfill_days = days;
        self
    }

    /// Fetch and detect for a single list.
    ///
    /// A failed fetch is returned as `FetchFailed` before anything is
    /// written; detection never runs on a substitute empty set.
    pub fn track_source(&self, source: Source, date: NaiveDate) -> Result<ChangeSet> {
        let current = self.fetcher.fetch_membership(source, date)?;
        DiffEngine::new(self.conn).detect_changes(source, date, &current)
    }

    /// Full daily run. Fetch failures are reported per list; storage
    /// failures during the live step are returned to the caller.
    pub fn run_daily(&self, today: NaiveDate) -> Result<DailyReport> {
        info!(%today, backfill_days = self.backfill_days, "daily run started");

        let orchestrator = BackfillOrchestrator::new(self.conn, self.fetcher);
        let backfill: Vec<BackfillReport> = Source::ALL
            .iter()
            .map(|&source| orchestrator.backfill_trailing(source, today, self.backfill_days))
            .collect::<Result<_>>()?;

        let mut report = DailyReport {
            date: today,
            backfill,
            changes: Vec::new(),
            skipped: Vec::new(),
            alerts: DispatchOutcome::default(),
        };

        for source in Source::ALL {
            match self.track_source(source, today) {
                Ok(changes) => {
                    let outcome = self.dispatcher.dispatch(today, source, &changes);
                    report.alerts.absorb(outcome);
                    report.changes.push(SourceChanges { source, changes });
                }
                Err(e) if e.is_fetch_failure() => {
                    warn!(%source, %today, error = %e, "skipping list for today");
                    report.skipped.push(SkippedSource {
                        source,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            %today,
            skipped = report.skipped.len(),
            alerts_sent = report.alerts.sent,
            "daily run finished"
        );

        Ok(report)
    }
}
