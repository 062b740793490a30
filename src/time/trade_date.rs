/// Fixed-width trade date value type (YYYYMMDD)
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SyncError};

const FORMAT: &str = "%Y%m%d";

/// A calendar date carried in the provider's 8-digit `YYYYMMDD` form.
///
/// Ordering is chronological, which also matches the lexicographic order of
/// the textual form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TradeDate(NaiveDate);

impl TradeDate {
    pub fn new(date: NaiveDate) -> Self {
        TradeDate(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(TradeDate)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Next calendar day
    pub fn succ(&self) -> Option<Self> {
        self.0.checked_add_days(Days::new(1)).map(TradeDate)
    }

    /// Previous calendar day
    pub fn pred(&self) -> Option<Self> {
        self.0.checked_sub_days(Days::new(1)).map(TradeDate)
    }
}

impl FromStr for TradeDate {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SyncError::InvalidArgument(format!(
                "date must be 8 digits YYYYMMDD, got '{}'",
                s
            )));
        }
        NaiveDate::parse_from_str(s, FORMAT)
            .map(TradeDate)
            .map_err(|e| SyncError::InvalidArgument(format!("invalid date '{}': {}", s, e)))
    }
}

impl fmt::Display for TradeDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(FORMAT))
    }
}

impl From<NaiveDate> for TradeDate {
    fn from(date: NaiveDate) -> Self {
        TradeDate(date)
    }
}

impl Serialize for TradeDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TradeDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
