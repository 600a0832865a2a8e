use chrono::{Local, NaiveDate};

/// Abstraction over "today" so month offsets are deterministic in tests.
///
/// The portal addresses statement periods relative to the current month, so
/// everything that parses or resolves months takes its notion of "now" from
/// here rather than reading the system clock directly.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Local wall-clock date. The portal's month dropdown counts back from the
/// user's local month, not UTC.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

#[derive(Debug, Clone)]
pub struct FixedClock {
    today: NaiveDate,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.today
    }
}
