// 📄 Compliance Data - Daily OTC compliance file → CE / EM membership
//
// The file is pipe-delimited with a header row. Relevant columns:
//   Symbol          ticker
//   Caveat Emptor   "Y" when the security carries the CE flag
//   OTC Tier ID     "40" for the Expert Market tier
//
// Files are published as compliance-data-YYYY-MM-DD-AM.txt, with a -PM
// edition later in the day. How they get onto disk is not our concern.

use crate::backfill::MembershipFetcher;
use crate::error::{MonitorError, Result};
use crate::model::{MembershipSet, Source};
use chrono::NaiveDate;
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const SYMBOL_COLUMN: &str = "Symbol";
const CAVEAT_EMPTOR_COLUMN: &str = "Caveat Emptor";
const TIER_COLUMN: &str = "OTC Tier ID";
const EXPERT_MARKET_TIER: &str = "40";

/// Editions tried in order
const EDITIONS: [&str; 2] = ["AM", "PM"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComplianceLists {
    pub caveat_emptor: MembershipSet,
    pub expert_market: MembershipSet,
}

impl ComplianceLists {
    pub fn get(&self, source: Source) -> &MembershipSet {
        match source {
            Source::CaveatEmptor => &self.caveat_emptor,
            Source::ExpertMarket => &self.expert_market,
        }
    }
}

fn malformed(path: &Path, reason: impl Into<String>) -> MonitorError {
    MonitorError::MalformedData {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Parse compliance file contents. `path` is only used in error messages.
pub fn parse_compliance_data(text: &str, path: &Path) -> Result<ComplianceLists> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'|')
        .quoting(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = rdr.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| malformed(path, format!("missing '{}' column", name)))
    };
    let idx_symbol = column(SYMBOL_COLUMN)?;
    let idx_ce = column(CAVEAT_EMPTOR_COLUMN)?;
    let idx_tier = column(TIER_COLUMN)?;

    let mut lists = ComplianceLists::default();
    let mut skipped = 0;

    for record in rdr.records() {
        let record = record?;

        // Short rows are truncated lines in the feed
        let (Some(symbol), Some(ce), Some(tier)) =
            (record.get(idx_symbol), record.get(idx_ce), record.get(idx_tier))
        else {
            skipped += 1;
            continue;
        };

        let symbol = symbol.trim();
        if symbol.is_empty() {
            skipped += 1;
            continue;
        }

        if ce.trim() == "Y" {
            lists.caveat_emptor.insert(symbol.to_string());
        }
        if tier.trim() == EXPERT_MARKET_TIER {
            lists.expert_market.insert(symbol.to_string());
        }
    }

    debug!(
        path = %path.display(),
        ce = lists.caveat_emptor.len(),
        em = lists.expert_market.len(),
        skipped,
        "parsed compliance data"
    );

    Ok(lists)
}

pub fn compliance_file_name(date: NaiveDate, edition: &str) -> String {
    format!("compliance-data-{}-{}.txt", date.format("%Y-%m-%d"), edition)
}

// ============================================================================
// DIRECTORY FETCHER
// ============================================================================

/// Reads compliance files from a local directory, AM edition first.
/// One file holds both lists, so the last parsed date is kept around.
pub struct DirectoryFetcher {
    dir: PathBuf,
    last: RefCell<Option<(NaiveDate, ComplianceLists)>>,
}

impl DirectoryFetcher {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        DirectoryFetcher {
            dir: dir.into(),
            last: RefCell::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Both lists for `date` from the first edition that reads and parses
    pub fn load_lists(&self, date: NaiveDate) -> std::result::Result<ComplianceLists, String> {
        let mut problems = Vec::new();

        for edition in EDITIONS {
            let path = self.dir.join(compliance_file_name(date, edition));
            let attempt = fs::read(&path)
                .map_err(MonitorError::from)
                .and_then(|bytes| parse_compliance_data(&String::from_utf8_lossy(&bytes), &path));

            match attempt {
                Ok(lists) => return Ok(lists),
                Err(e) => problems.push(format!("{}: {}", path.display(), e)),
            }
        }

        Err(problems.join("; "))
    }
}

impl MembershipFetcher for DirectoryFetcher {
    fn fetch_membership(&self, source: Source, date: NaiveDate) -> Result<MembershipSet> {
        if let Some((cached, lists)) = self.last.borrow().as_ref() {
            if *cached == date {
                return Ok(lists.get(source).clone());
            }
        }

        let lists = self
            .load_lists(date)
            .map_err(|reason| MonitorError::fetch_failed(source, date, reason))?;
        let members = lists.get(source).clone();
        *self.last.borrow_mut() = Some((date, lists));

        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Symbol|Security Name|OTC Tier ID|Caveat Emptor
AAAA|Alpha Corp|20|Y
BBBB|Beta Inc|40|N
CCCC|Gamma Ltd|40|Y
DDDD|Delta Co|21|N
SHORT|Truncated
";

    #[test]
    fn test_parse_sample() {
        let lists = parse_compliance_data(SAMPLE, Path::new("sample.txt")).unwrap();

        let ce: Vec<&str> = lists.caveat_emptor.iter().map(|s| s.as_str()).collect();
        let em: Vec<&str> = lists.expert_market.iter().map(|s| s.as_str()).collect();
        assert_eq!(ce, vec!["AAAA", "CCCC"]);
        assert_eq!(em, vec!["BBBB", "CCCC"]);
    }

    #[test]
    fn test_header_only_is_a_valid_empty_list() {
        let lists =
            parse_compliance_data("Symbol|OTC Tier ID|Caveat Emptor\n", Path::new("x.txt")).unwrap();
        assert!(lists.get(Source::CaveatEmptor).is_empty());
        assert!(lists.get(Source::ExpertMarket).is_empty());
    }

    #[test]
    fn test_missing_column_is_malformed() {
        let result = parse_compliance_data("Symbol|Caveat Emptor\nAAAA|Y\n", Path::new("x.txt"));
        assert!(matches!(result, Err(MonitorError::MalformedData { .. })));
    }

    #[test]
    fn test_quotes_are_literal() {
        let text = "Symbol|Security Name|OTC Tier ID|Caveat Emptor\nQQQQ|The \"Q\" Co|40|N\n";
        let lists = parse_compliance_data(text, Path::new("x.txt")).unwrap();
        assert!(lists.expert_market.contains("QQQQ"));
    }

    #[test]
    fn test_file_name() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(compliance_file_name(date, "PM"), "compliance-data-2025-03-07-PM.txt");
    }

    #[test]
    fn test_fetcher_falls_back_to_pm_and_parses_once_per_date() {
        let dir = tempfile::TempDir::new().unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let path = dir.path().join(compliance_file_name(day, "PM"));
        fs::write(&path, SAMPLE).unwrap();

        let fetcher = DirectoryFetcher::new(dir.path());
        let ce = fetcher.fetch_membership(Source::CaveatEmptor, day).unwrap();

        // Second list for the same date comes from the parsed copy
        fs::remove_file(&path).unwrap();
        let em = fetcher.fetch_membership(Source::ExpertMarket, day).unwrap();

        assert!(ce.contains("AAAA") && ce.contains("CCCC"));
        assert!(em.contains("BBBB") && em.contains("CCCC"));
        assert_eq!(fetcher.dir(), dir.path());
    }

    #[test]
    fn test_fetcher_reports_missing_file_as_fetch_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let fetcher = DirectoryFetcher::new(dir.path());

        let result = fetcher.fetch_membership(Source::ExpertMarket, day);

        assert!(matches!(result, Err(MonitorError::FetchFailed { .. })));

        // Failures are not cached; a file published later is picked up
        fs::write(dir.path().join(compliance_file_name(day, "AM")), SAMPLE).unwrap();
        assert!(fetcher.fetch_membership(Source::ExpertMarket, day).unwrap().contains("BBBB"));
    }
}
