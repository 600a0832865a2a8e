//! Merging per-month statements into one per-account document.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::reconcile::account_digits;

/// Concatenate every downloaded statement for `account` into a single
/// `<account>.pdf` in `dir`, then delete the sources.
///
/// Sources are taken in ascending filename order; the embedded `YYYY-MM` key
/// makes that chronological regardless of the order downloads arrived in.
/// The output keeps the account's configured separators, so it never matches
/// the per-month name pattern.
///
/// Returns the output path, or `None` when no statements were downloaded for
/// the account. Any read or write failure aborts the merge for this account;
/// already-consumed sources are not restored.
pub fn merge_account(dir: &Path, account: &str) -> Result<Option<PathBuf>> {
    let digits = account_digits(account);

    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list download directory: {}", dir.display()))?;

    let mut sources: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(digits.as_str()) && name.to_lowercase().ends_with(".pdf") {
            sources.push(entry.path());
        }
    }

    if sources.is_empty() {
        debug!(account, "no downloaded statements to merge");
        return Ok(None);
    }

    sources.sort();

    let mut merged = Vec::new();
    for source in &sources {
        let content = std::fs::read(source)
            .with_context(|| format!("Failed to read statement {}", source.display()))?;
        merged.extend_from_slice(&content);
    }

    let output = dir.join(format!("{account}.pdf"));
    std::fs::write(&output, &merged)
        .with_context(|| format!("Failed to write merged statement {}", output.display()))?;

    for source in &sources {
        std::fs::remove_file(source)
            .with_context(|| format!("Failed to remove merged source {}", source.display()))?;
    }

    info!(account, months = sources.len(), output = %output.display(), "merged statements");
    Ok(Some(output))
}
