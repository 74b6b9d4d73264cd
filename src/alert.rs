// 🔔 Alerts - Turn change sets into notifications
//
// The dispatcher is configured explicitly at construction (mute flag,
// work-hour window); nothing here reads process-wide state. Delivery
// goes through AlertSink so transports stay outside this crate.

use crate::error::Result;
use crate::model::{ChangeKind, ChangeSet, Source};
use chrono::{Local, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ============================================================================
// CONFIG
// ============================================================================

/// Daily window in which alerts may be delivered, local time.
/// `end` before `start` means the window wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl WorkHours {
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= time && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Suppress all delivery
    pub muted: bool,

    /// Only deliver inside this window (None = any time)
    pub work_hours: Option<WorkHours>,
}

impl AlertConfig {
    pub fn allows(&self, now: NaiveTime) -> bool {
        if self.muted {
            return false;
        }
        self.work_hours.map_or(true, |hours| hours.contains(now))
    }
}

// ============================================================================
// ALERT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub date: NaiveDate,
    pub source: Source,
    pub kind: ChangeKind,
    pub title: String,
    pub message: String,
}

/// One alert per non-empty kind, exits before entries
pub fn format_alerts(date: NaiveDate, source: Source, changes: &ChangeSet) -> Vec<Alert> {
    [ChangeKind::Exit, ChangeKind::Entry]
        .into_iter()
        .filter(|kind| !changes.tickers(*kind).is_empty())
        .map(|kind| {
            let marker = match kind {
                ChangeKind::Exit => "🚨",
                ChangeKind::Entry => "⚠️",
            };
            let header = format!(
                "{} {} {} ALERT ({}):",
                marker,
                source.name(),
                kind.label().to_uppercase(),
                date
            );

            Alert {
                date,
                source,
                kind,
                title: format!("{} {}", source.name(), kind.label()),
                message: std::iter::once(header)
                    .chain(changes.tickers(kind).iter().cloned())
                    .collect::<Vec<_>>()
                    .join("\n"),
            }
        })
        .collect()
}

// ============================================================================
// SINKS
// ============================================================================

/// AlertSink - Delivery transport (desktop, chat, mail...) lives behind this
pub trait AlertSink {
    fn send(&self, alert: &Alert) -> Result<()>;
}

/// Writes alerts to the log; the default when no transport is wired up
pub struct LogSink;

impl AlertSink for LogSink {
    fn send(&self, alert: &Alert) -> Result<()> {
        warn!(title = %alert.title, "{}", alert.message);
        Ok(())
    }
}

// ============================================================================
// DISPATCHER
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub sent: usize,
    pub suppressed: usize,
    pub failed: usize,
}

impl DispatchOutcome {
    pub fn absorb(&mut self, other: DispatchOutcome) {
        self.sent += other.sent;
        self.suppressed += other.suppressed;
        self.failed += other.failed;
    }
}

pub struct AlertDispatcher<S: AlertSink> {
    config: AlertConfig,
    sink: S,
}

impl<S: AlertSink> AlertDispatcher<S> {
    pub fn new(config: AlertConfig, sink: S) -> Self {
        AlertDispatcher { config, sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Dispatch using the local wall clock for the work-hour check
    pub fn dispatch(&self, date: NaiveDate, source: Source, changes: &ChangeSet) -> DispatchOutcome {
        self.dispatch_at(date, source, changes, Local::now().time())
    }

    /// Dispatch as if the local time were `now`. A failing sink is logged
    /// and counted; the remaining alerts are still attempted.
    pub fn dispatch_at(
        &self,
        date: NaiveDate,
        source: Source,
        changes: &ChangeSet,
        now: NaiveTime,
    ) -> DispatchOutcome {
        let alerts = format_alerts(date, source, changes);
        let mut outcome = DispatchOutcome::default();

        if !self.config.allows(now) {
            outcome.suppressed = alerts.len();
            if !alerts.is_empty() {
                info!(%source, %date, suppressed = alerts.len(), "alerts suppressed by config");
            }
            return outcome;
        }

        for alert in &alerts {
            match self.sink.send(alert) {
                Ok(()) => outcome.sent += 1,
                Err(e) => {
                    warn!(title = %alert.title, error = %e, "alert delivery failed");
                    outcome.failed += 1;
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingSink {
        sent: RefCell<Vec<Alert>>,
        fail_titles: Vec<String>,
    }

    impl AlertSink for RecordingSink {
        fn send(&self, alert: &Alert) -> Result<()> {
            if self.fail_titles.contains(&alert.title) {
                return Err(MonitorError::Alert("transport down".to_string()));
            }
            self.sent.borrow_mut().push(alert.clone());
            Ok(())
        }
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 2).unwrap()
    }

    fn changes() -> ChangeSet {
        ChangeSet {
            entered: vec!["CCC".to_string()],
            exited: vec!["AAA".to_string(), "BBB".to_string()],
        }
    }

    #[test]
    fn test_format_alerts() {
        let alerts = format_alerts(day(), Source::CaveatEmptor, &changes());

        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].title, "Caveat Emptor Exit");
        assert!(alerts[0].message.ends_with("\nAAA\nBBB"));
        assert_eq!(alerts[1].title, "Caveat Emptor Entry");
        assert!(alerts[1].message.contains("ENTRY ALERT"));

        assert!(format_alerts(day(), Source::ExpertMarket, &ChangeSet::default()).is_empty());
    }

    #[test]
    fn test_work_hours_window() {
        let hours = WorkHours { start: time(9, 0), end: time(17, 0) };
        assert!(hours.contains(time(9, 0)));
        assert!(hours.contains(time(16, 59)));
        assert!(!hours.contains(time(17, 0)));
        assert!(!hours.contains(time(3, 0)));

        let overnight = WorkHours { start: time(22, 0), end: time(6, 0) };
        assert!(overnight.contains(time(23, 30)));
        assert!(overnight.contains(time(5, 0)));
        assert!(!overnight.contains(time(12, 0)));
    }

    #[test]
    fn test_muted_dispatcher_sends_nothing() {
        let config = AlertConfig { muted: true, work_hours: None };
        let dispatcher = AlertDispatcher::new(config, RecordingSink::default());

        let outcome = dispatcher.dispatch_at(day(), Source::CaveatEmptor, &changes(), time(10, 0));

        assert_eq!(outcome, DispatchOutcome { sent: 0, suppressed: 2, failed: 0 });
        assert!(dispatcher.sink().sent.borrow().is_empty());
    }

    #[test]
    fn test_outside_work_hours_suppressed() {
        let config = AlertConfig {
            muted: false,
            work_hours: Some(WorkHours { start: time(9, 0), end: time(17, 0) }),
        };
        let dispatcher = AlertDispatcher::new(config, RecordingSink::default());

        let night = dispatcher.dispatch_at(day(), Source::ExpertMarket, &changes(), time(20, 0));
        let noon = dispatcher.dispatch_at(day(), Source::ExpertMarket, &changes(), time(12, 0));

        assert_eq!(night.suppressed, 2);
        assert_eq!(noon.sent, 2);
        assert_eq!(dispatcher.sink().sent.borrow().len(), 2);
    }

    #[test]
    fn test_failing_sink_does_not_stop_other_alerts() {
        let sink = RecordingSink {
            sent: RefCell::new(Vec::new()),
            fail_titles: vec!["Caveat Emptor Exit".to_string()],
        };
        let dispatcher = AlertDispatcher::new(AlertConfig::default(), sink);

        let outcome = dispatcher.dispatch_at(day(), Source::CaveatEmptor, &changes(), time(10, 0));

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.sent, 1);
        assert_eq!(dispatcher.sink().sent.borrow()[0].kind, ChangeKind::Entry);
    }
}
