//! The download-completion state machine.
//!
//! The archive UI is stateful and latency-variable: searches time out,
//! downloads lag the click that started them, and a month can simply have no
//! statement. One pass over the requested months is therefore not reliable.
//! The driver runs repeated passes, after each one reconciling the download
//! directory against what is still outstanding, until every month is either
//! confirmed on disk or confirmed unobtainable.
//!
//! Each pass can only shrink the outstanding set, never grow it, so the loop
//! converges as long as the portal eventually answers. For months where it
//! never does, the pass budget bounds the loop and the leftovers come back
//! as `unresolved` instead of hanging the run.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::months::{resolve_range, MonthOffset, YearMonth};
use crate::portal::{SearchOutcome, StatementPortal};
use crate::reconcile::{account_digits, downloaded_offsets};

/// How one account's requested months ended up.
#[derive(Debug, Clone)]
pub struct AccountReport {
    pub account: String,
    /// Confirmed on disk, chronological.
    pub downloaded: Vec<YearMonth>,
    /// The portal explicitly reported no statement; never retried.
    pub unavailable: Vec<YearMonth>,
    /// Still outstanding when the pass budget ran out.
    pub unresolved: Vec<YearMonth>,
}

impl AccountReport {
    /// Every requested month was either downloaded or ruled unobtainable.
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Drives search/download passes for one account at a time until its
/// outstanding months are gone or the pass budget is spent.
pub struct ExtractionDriver<P> {
    portal: P,
    download_dir: PathBuf,
    max_passes: u32,
    clock: Arc<dyn Clock>,
}

impl<P: StatementPortal> ExtractionDriver<P> {
    pub fn new(portal: P, download_dir: PathBuf, max_passes: u32) -> Self {
        Self {
            portal,
            download_dir,
            max_passes,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Hand the portal session back, e.g. to close it after the last account.
    pub fn into_portal(self) -> P {
        self.portal
    }

    /// Process one account's configured month range to completion.
    ///
    /// Only a portal-level hard error (the browser session dying) surfaces as
    /// `Err`; timeouts and unavailable months are absorbed into the report.
    pub async fn run_account(
        &mut self,
        account: &str,
        from: YearMonth,
        to: YearMonth,
    ) -> Result<AccountReport> {
        let digits = account_digits(account);
        let today = self.clock.today();

        let mut outstanding: BTreeSet<MonthOffset> =
            resolve_range(today, from, to).into_iter().collect();
        let mut downloaded: BTreeSet<MonthOffset> = BTreeSet::new();
        let mut unavailable: BTreeSet<MonthOffset> = BTreeSet::new();

        info!(account, months = outstanding.len(), "extracting statements");

        if outstanding.is_empty() {
            return Ok(self.report(account, today, downloaded, unavailable, outstanding));
        }

        self.portal.select_account(&digits).await?;

        let mut passes = 0;
        while !outstanding.is_empty() {
            if passes >= self.max_passes {
                warn!(
                    account,
                    remaining = outstanding.len(),
                    max_passes = self.max_passes,
                    "pass budget exhausted with months still outstanding"
                );
                break;
            }
            passes += 1;

            // Snapshot: unavailable months are removed mid-pass.
            for offset in outstanding.iter().copied().collect::<Vec<_>>() {
                let period = YearMonth::from_offset(today, offset);
                match self.portal.search_month(offset).await? {
                    SearchOutcome::DownloadStarted => {
                        // Not confirmed yet; only the filesystem scan below
                        // removes it from outstanding.
                        debug!(account, %period, "download triggered");
                    }
                    SearchOutcome::Unavailable => {
                        outstanding.remove(&offset);
                        unavailable.insert(offset);
                        info!(account, %period, "no statement available");
                    }
                    SearchOutcome::TimedOut => {
                        warn!(account, %period, "search timed out, will retry");
                    }
                }
            }

            // Reconcile against what actually landed on disk. "Today" is
            // re-read so offsets parsed from filenames stay correct if the
            // run crosses a month boundary.
            let now = self.clock.today();
            for offset in downloaded_offsets(&self.download_dir, &digits, now)? {
                if outstanding.remove(&offset) {
                    downloaded.insert(offset);
                    debug!(account, period = %YearMonth::from_offset(now, offset), "download confirmed");
                }
            }
        }

        Ok(self.report(account, today, downloaded, unavailable, outstanding))
    }

    fn report(
        &self,
        account: &str,
        today: chrono::NaiveDate,
        downloaded: BTreeSet<MonthOffset>,
        unavailable: BTreeSet<MonthOffset>,
        unresolved: BTreeSet<MonthOffset>,
    ) -> AccountReport {
        let periods = |offsets: BTreeSet<MonthOffset>| {
            let mut months: Vec<YearMonth> = offsets
                .into_iter()
                .map(|offset| YearMonth::from_offset(today, offset))
                .collect();
            months.sort();
            months
        };
        AccountReport {
            account: account.to_string(),
            downloaded: periods(downloaded),
            unavailable: periods(unavailable),
            unresolved: periods(unresolved),
        }
    }
}
