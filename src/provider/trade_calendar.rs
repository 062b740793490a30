/// Exchange trade calendar served by Tushare `trade_cal`, cached per year
use async_trait::async_trait;
use chrono::Datelike;
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::TushareClient;
use crate::error::Result;
use crate::time::{ExchangeDirectory, TradeCalendar, TradeDate};

/// Years to look ahead for the next open day before giving up
const LOOKAHEAD_YEARS: i32 = 2;

type OpenDays = Arc<BTreeSet<TradeDate>>;

/// Calendar that asks the provider which days each exchange is open.
///
/// Years are fetched whole and kept for the lifetime of the calendar. A year
/// the provider has not published yet is not cached, so it is asked again on
/// the next lookup.
pub struct TushareCalendar {
    client: Arc<TushareClient>,
    directory: ExchangeDirectory,
    years: RwLock<HashMap<(String, i32), OpenDays>>,
}

impl TushareCalendar {
    pub fn new(client: Arc<TushareClient>, directory: ExchangeDirectory) -> Self {
        TushareCalendar {
            client,
            directory,
            years: RwLock::new(HashMap::new()),
        }
    }

    /// Open days of one calendar year, None if the provider has none
    async fn open_days(&self, exchange: &str, year: i32) -> Result<Option<OpenDays>> {
        let key = (exchange.to_string(), year);
        if let Some(days) = self.years.read().await.get(&key) {
            return Ok(Some(days.clone()));
        }

        let (Some(first), Some(last)) = (TradeDate::from_ymd(year, 1, 1), TradeDate::from_ymd(year, 12, 31)) else {
            return Ok(None);
        };

        let days = self.client.trade_cal(exchange, first, last).await?;
        if days.is_empty() {
            warn!(exchange, year, "Provider has no trade calendar for year");
            return Ok(None);
        }

        let open: OpenDays = Arc::new(days.into_iter().filter(|d| d.is_open).map(|d| d.date).collect());
        debug!(exchange, year, open_days = open.len(), "Trade calendar cached");
        self.years.write().await.insert(key, open.clone());

        Ok(Some(open))
    }
}

#[async_trait]
impl TradeCalendar for TushareCalendar {
    async fn exchange_of(&self, code: &str) -> Result<String> {
        self.directory.resolve(code)
    }

    async fn next_trading_date(&self, exchange: &str, date: TradeDate) -> Result<Option<TradeDate>> {
        let Some(after) = date.succ() else {
            return Ok(None);
        };

        let first_year = after.date().year();
        for year in first_year..=first_year + LOOKAHEAD_YEARS {
            let Some(open) = self.open_days(exchange, year).await? else {
                return Ok(None);
            };
            if let Some(next) = open.range((Excluded(date), Unbounded)).next() {
                return Ok(Some(*next));
            }
        }

        Ok(None)
    }
}
