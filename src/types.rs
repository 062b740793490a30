/// Core type definitions for the index mirror
use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::time::TradeDate;

/// One daily row for one index, as delivered by the provider.
///
/// Only the instrument code and trade date are interpreted; every other
/// column is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    #[serde(rename = "ts_code")]
    pub instrument_code: String,
    pub trade_date: TradeDate,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl DailyRecord {
    pub fn new(instrument_code: impl Into<String>, trade_date: TradeDate) -> Self {
        DailyRecord {
            instrument_code: instrument_code.into(),
            trade_date,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// Watch-list entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedInstrument {
    pub code: String,
    pub exchange: String,
}

/// Holiday calendar for one exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeCalendarConfig {
    pub code: String,
    /// ts_code suffix of instruments listed here, e.g. "SH"
    pub suffix: String,
    pub covered_from: TradeDate,
    pub covered_until: TradeDate,
    #[serde(default)]
    pub holidays: Vec<TradeDate>,
}

/// Remote provider settings
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: u64,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    #[serde(default = "default_retry_backoffs_sec")]
    pub retry_backoffs_sec: Vec<u64>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            api_url: default_api_url(),
            token: String::new(),
            timeout_sec: default_timeout_sec(),
            requests_per_minute: default_requests_per_minute(),
            retry_backoffs_sec: default_retry_backoffs_sec(),
        }
    }
}

/// Trade calendar backing the sync engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarSource {
    /// Provider `trade_cal`, fetched per year
    #[default]
    Tushare,
    /// Configured holiday lists, bounded by each exchange's covered range
    Holidays,
}

/// Configuration for the index mirror
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Logging
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,

    // Storage
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    // Clock
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Local time after which today's bar counts as published
    #[serde(default = "default_publish_cutoff")]
    pub publish_cutoff: String,

    // Instruments
    #[serde(default = "default_benchmark")]
    pub benchmark: String,
    pub watch_list: Vec<WatchedInstrument>,
    pub exchanges: Vec<ExchangeCalendarConfig>,
    /// Where trading days come from
    #[serde(default)]
    pub calendar: CalendarSource,

    #[serde(default)]
    pub provider: ProviderConfig,
}

impl Config {
    pub fn tz(&self) -> Option<Tz> {
        self.timezone.parse().ok()
    }

    pub fn publish_cutoff_time(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.publish_cutoff, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(&self.publish_cutoff, "%H:%M"))
            .ok()
    }

    pub fn is_watched(&self, code: &str) -> bool {
        self.watch_list.iter().any(|w| w.code == code)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_timezone() -> String {
    "Asia/Shanghai".to_string()
}

fn default_publish_cutoff() -> String {
    "17:00".to_string()
}

fn default_benchmark() -> String {
    "000001.SH".to_string()
}

fn default_api_url() -> String {
    "http://api.tushare.pro".to_string()
}

fn default_timeout_sec() -> u64 {
    30
}

fn default_requests_per_minute() -> u32 {
    200
}

fn default_retry_backoffs_sec() -> Vec<u64> {
    vec![1, 2, 5]
}
