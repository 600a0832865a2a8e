//! Reconciling the download directory against requested months.
//!
//! The portal writes each statement as
//! `<11-digit-account>_-_<YYYY-MM>[suffix].pdf` into the working directory.
//! Download completion is never signalled through the UI, so the only way to
//! know a month has actually arrived is to rescan the directory and parse the
//! names back into `(account, period)` pairs.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use regex::Regex;

use crate::months::{MonthOffset, YearMonth};

/// Statement name pattern dictated by the portal's export filenames.
fn statement_name() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\d{11})_-_(\d{4}-\d{2})").expect("statement name pattern is valid")
    })
}

/// Strip separators from a configured account identifier, leaving the
/// 11-digit form the portal uses in select values and filenames.
pub fn account_digits(account: &str) -> String {
    account.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// `(account, period)` recovered from a downloaded statement's filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedStatement {
    pub account_digits: String,
    pub period: YearMonth,
}

impl ParsedStatement {
    /// Parse a directory entry name. Only `.pdf` files are considered; any
    /// suffix between the period and the extension is ignored. Names that do
    /// not carry the pattern are simply not statements.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (stem, ext) = name.rsplit_once('.')?;
        if !ext.eq_ignore_ascii_case("pdf") {
            return None;
        }
        let captures = statement_name().captures(stem)?;
        let period = YearMonth::from_yyyy_mm(&captures[2]).ok()?;
        Some(Self {
            account_digits: captures[1].to_string(),
            period,
        })
    }
}

/// Scan `dir` and return the offsets, relative to `today`, of every
/// statement already downloaded for `account_digits`.
///
/// This reads the directory fresh on every call; the portal keeps writing
/// files between polls, so a cached listing would miss arrivals.
pub fn downloaded_offsets(
    dir: &Path,
    account_digits: &str,
    today: NaiveDate,
) -> Result<BTreeSet<MonthOffset>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list download directory: {}", dir.display()))?;

    let mut offsets = BTreeSet::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(parsed) = ParsedStatement::from_file_name(&name.to_string_lossy()) else {
            continue;
        };
        if parsed.account_digits == account_digits {
            offsets.insert(parsed.period.offset_from(today));
        }
    }
    Ok(offsets)
}

/// Delete every per-month statement file in `dir`, regardless of account.
///
/// Safety net for runs that were interrupted before their merge step; merged
/// outputs are named from the separator-bearing account string and never
/// match the pattern, so they survive. Returns the number of files removed.
pub fn sweep(dir: &Path) -> Result<usize> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list download directory: {}", dir.display()))?;

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        if ParsedStatement::from_file_name(&name.to_string_lossy()).is_some() {
            std::fs::remove_file(entry.path())
                .with_context(|| format!("Failed to remove {}", entry.path().display()))?;
            removed += 1;
        }
    }
    Ok(removed)
}
