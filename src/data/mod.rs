pub mod daily_store;

use async_trait::async_trait;

use crate::error::Result;
use crate::time::TradeDate;
use crate::types::DailyRecord;

pub use daily_store::JsonlDailyStore;

/// Local persistence for daily records, keyed by (instrument, trade date)
#[async_trait]
pub trait DailyStore: Send + Sync {
    /// Insert records whose (instrument, trade date) pair is not stored yet.
    /// Returns how many were actually written; empty input is a no-op.
    async fn insert_many(&self, records: Vec<DailyRecord>) -> Result<usize>;

    /// Records of `code` with `start <= trade_date <= end`, newest first.
    /// An absent `start` leaves the range open to the left.
    async fn query_range(
        &self,
        code: &str,
        start: Option<TradeDate>,
        end: TradeDate,
    ) -> Result<Vec<DailyRecord>>;

    /// Most recent record of `code`
    async fn latest(&self, code: &str) -> Result<Option<DailyRecord>>;

    /// Oldest record of `code`
    async fn earliest(&self, code: &str) -> Result<Option<DailyRecord>>;
}
