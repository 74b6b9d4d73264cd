use crate::model::Source;
use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    /// The collaborator could not produce a membership set for this date.
    /// Never substitute an empty set for this.
    #[error("Fetch failed for {list} on {date}: {reason}")]
    FetchFailed {
        list: Source,
        date: NaiveDate,
        reason: String,
    },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] rusqlite::Error),

    #[error("Invalid date range: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Window of {days} days before {date} is out of the supported date range")]
    WindowOutOfRange { date: NaiveDate, days: u32 },

    #[error("Malformed compliance data in {path:?}: {reason}")]
    MalformedData { path: PathBuf, reason: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Alert delivery failed: {0}")]
    Alert(String),
}

impl MonitorError {
    pub fn fetch_failed(list: Source, date: NaiveDate, reason: impl Into<String>) -> Self {
        MonitorError::FetchFailed {
            list,
            date,
            reason: reason.into(),
        }
    }

    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, MonitorError::FetchFailed { .. })
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
