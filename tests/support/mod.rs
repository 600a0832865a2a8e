use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use dnb_statements::months::{MonthOffset, YearMonth};
use dnb_statements::portal::{SearchOutcome, StatementPortal};

/// One scripted answer for a month search.
#[derive(Debug, Clone, Copy)]
pub enum Scripted {
    /// Bounded wait expires; nothing happens.
    Timeout,
    /// Portal reports no statement for the month.
    Unavailable,
    /// Download is triggered but the file has not landed yet.
    StartLagged,
    /// Download is triggered and the file appears on disk.
    StartAndLand,
}

#[derive(Default)]
struct Inner {
    script: HashMap<MonthOffset, VecDeque<Scripted>>,
    searches: HashMap<MonthOffset, usize>,
    selected_accounts: Vec<String>,
}

/// Scripted portal standing in for the browser session.
///
/// Each month offset plays back its scripted outcomes in order; once a
/// script runs dry the offset keeps timing out, which is also the behavior
/// for unscripted offsets.
#[derive(Clone)]
pub struct FakePortal {
    inner: Arc<Mutex<Inner>>,
    download_dir: PathBuf,
    today: NaiveDate,
}

impl FakePortal {
    pub fn new(download_dir: PathBuf, today: NaiveDate) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            download_dir,
            today,
        }
    }

    pub fn script(self, offset: MonthOffset, outcomes: &[Scripted]) -> Self {
        self.inner
            .lock()
            .unwrap()
            .script
            .insert(offset, outcomes.iter().copied().collect());
        self
    }

    pub fn searches(&self, offset: MonthOffset) -> usize {
        self.inner
            .lock()
            .unwrap()
            .searches
            .get(&offset)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_searches(&self) -> usize {
        self.inner.lock().unwrap().searches.values().sum()
    }

    pub fn selected_accounts(&self) -> Vec<String> {
        self.inner.lock().unwrap().selected_accounts.clone()
    }

    fn current_account(&self) -> String {
        self.inner
            .lock()
            .unwrap()
            .selected_accounts
            .last()
            .cloned()
            .expect("search_month before select_account")
    }

    fn write_statement(&self, offset: MonthOffset) {
        let period = YearMonth::from_offset(self.today, offset);
        let name = format!("{}_-_{period}.pdf", self.current_account());
        std::fs::write(self.download_dir.join(name), format!("statement {period}")).unwrap();
    }
}

#[async_trait]
impl StatementPortal for FakePortal {
    async fn select_account(&mut self, account_digits: &str) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .selected_accounts
            .push(account_digits.to_string());
        Ok(())
    }

    async fn search_month(&mut self, offset: MonthOffset) -> Result<SearchOutcome> {
        let scripted = {
            let mut inner = self.inner.lock().unwrap();
            *inner.searches.entry(offset).or_insert(0) += 1;
            inner
                .script
                .get_mut(&offset)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Scripted::Timeout)
        };

        Ok(match scripted {
            Scripted::Timeout => SearchOutcome::TimedOut,
            Scripted::Unavailable => SearchOutcome::Unavailable,
            Scripted::StartLagged => SearchOutcome::DownloadStarted,
            Scripted::StartAndLand => {
                self.write_statement(offset);
                SearchOutcome::DownloadStarted
            }
        })
    }
}
