pub mod trade_calendar;
pub mod tushare;

use async_trait::async_trait;

use crate::error::Result;
use crate::time::TradeDate;
use crate::types::DailyRecord;

pub use trade_calendar::TushareCalendar;
pub use tushare::{CalendarDay, TushareClient};

/// Remote source of daily index history
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Daily records for `code`, bounded by the optional inclusive dates.
    /// Unbounded on both sides returns the whole available history.
    async fn fetch_daily(
        &self,
        code: &str,
        start: Option<TradeDate>,
        end: Option<TradeDate>,
    ) -> Result<Vec<DailyRecord>>;
}
