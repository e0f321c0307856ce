use chrono::{Duration, NaiveDate};
use std::fmt;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Date bounds sent to the statements endpoint. A missing bound is left out
/// of the request: no `from` means the bank's default start, no `till` means
/// "through today".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatementWindow {
    pub from: Option<NaiveDate>,
    pub till: Option<NaiveDate>,
}

impl StatementWindow {
    pub fn new(from: Option<NaiveDate>, till: Option<NaiveDate>) -> Self {
        Self { from, till }
    }

    /// Open-ended window starting `days` before `today`.
    pub fn trailing(days: u32, today: NaiveDate) -> Self {
        Self {
            from: Some(today - Duration::days(i64::from(days))),
            till: None,
        }
    }

    pub fn from_param(&self) -> Option<String> {
        self.from.map(|d| d.format(DATE_FORMAT).to_string())
    }

    pub fn till_param(&self) -> Option<String> {
        self.till.map(|d| d.format(DATE_FORMAT).to_string())
    }
}

impl fmt::Display for StatementWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.from, self.till) {
            (Some(from), Some(till)) => write!(f, "{from} to {till}"),
            (Some(from), None) => write!(f, "{from} to now"),
            (None, Some(till)) => write!(f, "up to {till}"),
            (None, None) => write!(f, "all"),
        }
    }
}
