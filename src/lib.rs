// CE Monitor - Core Library
// Tracks Caveat Emptor / Expert Market list entries and exits for OTC tickers.
// Exposes all modules for use in the CLI and tests.

pub mod db;
pub mod error;
pub mod model;
pub mod snapshot;   // Snapshot Store - (source, ticker, date) observations
pub mod history;    // History Resolver - "previous membership" policy
pub mod diff;       // Diff Engine - entries/exits per (source, date)
pub mod ledger;     // Change Ledger - deduplicated event history
pub mod backfill;   // Backfill Orchestrator - gap repair
pub mod compliance; // Compliance file parsing + directory fetcher
pub mod alert;      // Alert formatting and dispatch
pub mod monitor;    // Daily run
pub mod config;

// Re-export commonly used types
pub use db::{open_database, open_in_memory, setup_database, with_immediate_transaction};
pub use error::{MonitorError, Result};
pub use model::{
    ChangeEvent, ChangeKind, ChangeSet, MembershipSet, Observation, ParseSourceError, Source,
};
pub use snapshot::SnapshotStore;
pub use history::HistoryResolver;
pub use diff::{diff_sets, DiffEngine};
pub use ledger::{write_events_csv, ChangeLedger};
pub use backfill::{
    days_before, BackfillMode, BackfillOrchestrator, BackfillReport, FailedDate, MembershipFetcher,
};
pub use compliance::{compliance_file_name, parse_compliance_data, ComplianceLists, DirectoryFetcher};
pub use alert::{
    format_alerts, Alert, AlertConfig, AlertDispatcher, AlertSink, DispatchOutcome, LogSink,
    WorkHours,
};
pub use monitor::{DailyReport, Monitor, SkippedSource, SourceChanges};
pub use config::Config;
