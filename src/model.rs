// 📋 Domain Model - Sources, observations, change events
// Everything the tracker stores or returns is built from these types.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Set of tickers on one source's list for one date.
/// Ordered so iteration is always lexicographic.
pub type MembershipSet = BTreeSet<String>;

// ============================================================================
// SOURCE
// ============================================================================

/// Source - Which designation list a ticker was observed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Source {
    /// Public interest concern flag
    #[serde(rename = "CE")]
    CaveatEmptor,

    /// Restricted tier (OTC tier id 40)
    #[serde(rename = "EM")]
    ExpertMarket,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::CaveatEmptor, Source::ExpertMarket];

    /// Human-readable name for alerts and reports
    pub fn name(&self) -> &'static str {
        match self {
            Source::CaveatEmptor => "Caveat Emptor",
            Source::ExpertMarket => "Expert Market",
        }
    }

    /// Short code, also the stored column value
    pub fn code(&self) -> &'static str {
        match self {
            Source::CaveatEmptor => "CE",
            Source::ExpertMarket => "EM",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown source '{0}' (expected CE or EM)")]
pub struct ParseSourceError(pub String);

impl FromStr for Source {
    type Err = ParseSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', '_'], " ");
        match normalized.as_str() {
            "ce" | "caveat emptor" => Ok(Source::CaveatEmptor),
            "em" | "expert market" | "expert" => Ok(Source::ExpertMarket),
            _ => Err(ParseSourceError(s.to_string())),
        }
    }
}

impl ToSql for Source {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for Source {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

// ============================================================================
// CHANGE KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Ticker appeared on the list
    Entry,
    /// Ticker left the list
    Exit,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Entry => "entry",
            ChangeKind::Exit => "exit",
        }
    }

    /// Title-case label used in alert titles
    pub fn label(&self) -> &'static str {
        match self {
            ChangeKind::Entry => "Entry",
            ChangeKind::Exit => "Exit",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl ToSql for ChangeKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ChangeKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "entry" => Ok(ChangeKind::Entry),
            "exit" => Ok(ChangeKind::Exit),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

// ============================================================================
// OBSERVATION
// ============================================================================

/// "ticker was a member of source's list on date"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Observation {
    pub source: Source,
    pub ticker: String,
    pub date: NaiveDate,
}

// ============================================================================
// CHANGE EVENT
// ============================================================================

/// A detected transition, as stored in the change ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Stable identity handed to alert consumers
    pub event_id: String,
    pub date: NaiveDate,
    pub source: Source,
    pub ticker: String,
    pub kind: ChangeKind,
    /// When the tracker recorded the event
    pub detected_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(date: NaiveDate, source: Source, ticker: &str, kind: ChangeKind) -> Self {
        ChangeEvent {
            event_id: uuid::Uuid::new_v4().to_string(),
            date,
            source,
            ticker: ticker.to_string(),
            kind,
            detected_at: Utc::now(),
        }
    }
}

// ============================================================================
// CHANGE SET
// ============================================================================

/// Result of one detection run for (source, date)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Sorted ascending
    pub entered: Vec<String>,
    /// Sorted ascending
    pub exited: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty() && self.exited.is_empty()
    }

    pub fn tickers(&self, kind: ChangeKind) -> &[String] {
        match kind {
            ChangeKind::Entry => &self.entered,
            ChangeKind::Exit => &self.exited,
        }
    }

    pub fn total(&self) -> usize {
        self.entered.len() + self.exited.len()
    }
}
