/// Exchange trade calendars and the walk over their trading days
use async_trait::async_trait;
use chrono::{Datelike, Weekday};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use super::TradeDate;
use crate::error::{Result, SyncError};
use crate::types::{ExchangeCalendarConfig, WatchedInstrument};

/// Calendar capability the sync engine depends on
#[async_trait]
pub trait TradeCalendar: Send + Sync {
    /// Exchange that lists `code`
    async fn exchange_of(&self, code: &str) -> Result<String>;

    /// First trading date strictly after `date`, or None if the calendar
    /// cannot tell
    async fn next_trading_date(&self, exchange: &str, date: TradeDate) -> Result<Option<TradeDate>>;
}

/// Maps instrument codes to exchanges: watch-list entries first, then the
/// ts_code suffix
#[derive(Debug, Clone)]
pub struct ExchangeDirectory {
    instruments: HashMap<String, String>,
    suffixes: HashMap<String, String>,
}

impl ExchangeDirectory {
    pub fn new(exchanges: &[ExchangeCalendarConfig], watch_list: &[WatchedInstrument]) -> Self {
        let instruments = watch_list
            .iter()
            .map(|w| (w.code.clone(), w.exchange.clone()))
            .collect();
        let suffixes = exchanges
            .iter()
            .map(|cfg| (cfg.suffix.to_uppercase(), cfg.code.clone()))
            .collect();

        ExchangeDirectory { instruments, suffixes }
    }

    pub fn resolve(&self, code: &str) -> Result<String> {
        if let Some(exchange) = self.instruments.get(code) {
            return Ok(exchange.clone());
        }

        // e.g. 000001.SH -> SSE
        code.rsplit_once('.')
            .and_then(|(_, suffix)| self.suffixes.get(&suffix.to_uppercase()))
            .cloned()
            .ok_or_else(|| SyncError::UnknownInstrument(code.to_string()))
    }
}

struct ExchangeDays {
    covered_from: TradeDate,
    covered_until: TradeDate,
    holidays: BTreeSet<TradeDate>,
}

/// Calendar built from per-exchange holiday lists.
///
/// Answers are only given inside each exchange's covered range; past it the
/// holiday list is unknown and `next_trading_date` returns None.
pub struct HolidayCalendar {
    exchanges: HashMap<String, ExchangeDays>,
    directory: ExchangeDirectory,
}

impl HolidayCalendar {
    pub fn new(exchanges: &[ExchangeCalendarConfig], watch_list: &[WatchedInstrument]) -> Self {
        let directory = ExchangeDirectory::new(exchanges, watch_list);
        let exchanges = exchanges
            .iter()
            .map(|cfg| {
                (
                    cfg.code.clone(),
                    ExchangeDays {
                        covered_from: cfg.covered_from,
                        covered_until: cfg.covered_until,
                        holidays: cfg.holidays.iter().copied().collect(),
                    },
                )
            })
            .collect();

        HolidayCalendar { exchanges, directory }
    }

    fn days(&self, exchange: &str) -> Result<&ExchangeDays> {
        self.exchanges
            .get(exchange)
            .ok_or_else(|| SyncError::CalendarError(format!("No calendar for exchange {}", exchange)))
    }

    /// Weekday that is not a configured holiday, inside the covered range
    pub fn is_trading_day(&self, exchange: &str, date: TradeDate) -> Result<Option<bool>> {
        let days = self.days(exchange)?;
        if date < days.covered_from || date > days.covered_until {
            return Ok(None);
        }
        let weekday = date.date().weekday();
        if weekday == Weekday::Sat || weekday == Weekday::Sun {
            return Ok(Some(false));
        }
        Ok(Some(!days.holidays.contains(&date)))
    }

    fn next_after(&self, exchange: &str, date: TradeDate) -> Result<Option<TradeDate>> {
        let mut candidate = match date.succ() {
            Some(d) => d,
            None => return Ok(None),
        };

        loop {
            match self.is_trading_day(exchange, candidate)? {
                None => return Ok(None),
                Some(true) => return Ok(Some(candidate)),
                Some(false) => {}
            }
            candidate = match candidate.succ() {
                Some(d) => d,
                None => return Ok(None),
            };
        }
    }
}

#[async_trait]
impl TradeCalendar for HolidayCalendar {
    async fn exchange_of(&self, code: &str) -> Result<String> {
        self.directory.resolve(code)
    }

    async fn next_trading_date(&self, exchange: &str, date: TradeDate) -> Result<Option<TradeDate>> {
        let next = self.next_after(exchange, date)?;
        debug!(exchange, %date, next = ?next.map(|d| d.to_string()), "Next trading date");
        Ok(next)
    }
}

/// Result of walking the calendar over a date range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradingDays {
    /// Trading dates the calendar could enumerate, ascending
    pub dates: Vec<TradeDate>,
    /// First date the calendar could not classify, if the walk stopped early
    pub unknown_from: Option<TradeDate>,
}

/// Walk `[start, end]` one trading date at a time.
///
/// Stops at `end`, or where the calendar can no longer tell what comes next.
pub async fn walk_trading_dates(
    calendar: &dyn TradeCalendar,
    exchange: &str,
    start: TradeDate,
    end: TradeDate,
) -> Result<TradingDays> {
    let mut dates = Vec::new();
    if start > end {
        return Ok(TradingDays { dates, unknown_from: None });
    }

    let Some(mut cursor) = start.pred() else {
        return Ok(TradingDays {
            dates,
            unknown_from: Some(start),
        });
    };

    while cursor < end {
        match calendar.next_trading_date(exchange, cursor).await? {
            None => {
                let unknown_from = cursor.succ().unwrap_or(end).max(start);
                return Ok(TradingDays {
                    dates,
                    unknown_from: Some(unknown_from),
                });
            }
            Some(next) if next > end => break,
            Some(next) => {
                dates.push(next);
                cursor = next;
            }
        }
    }

    Ok(TradingDays { dates, unknown_from: None })
}
