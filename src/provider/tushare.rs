/// Tushare Pro REST client: index daily bars and the exchange trade calendar
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use super::RemoteSource;
use crate::error::{Result, SyncError};
use crate::time::TradeDate;
use crate::types::{DailyRecord, ProviderConfig};
use crate::utils::{with_retry, RateLimiter};

const INDEX_DAILY_API: &str = "index_daily";
const TRADE_CAL_API: &str = "trade_cal";

/// Tushare answers this code when the per-minute quota is exhausted
const RATE_LIMIT_CODE: i64 = 40203;

#[derive(Debug, Serialize)]
struct ApiRequest<'a, P> {
    api_name: &'a str,
    token: &'a str,
    params: &'a P,
    fields: &'a str,
}

#[derive(Debug, Serialize)]
struct IndexDailyParams {
    ts_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_date: Option<String>,
}

#[derive(Debug, Serialize)]
struct TradeCalParams {
    exchange: String,
    start_date: String,
    end_date: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    data: Option<ApiTable>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiTable {
    fields: Vec<String>,
    items: Vec<Vec<Value>>,
}

impl ApiTable {
    /// Rows as column-name maps
    fn into_rows(self) -> impl Iterator<Item = BTreeMap<String, Value>> {
        let fields = self.fields;
        self.items
            .into_iter()
            .map(move |row| fields.iter().cloned().zip(row).collect())
    }
}

/// One day of an exchange calendar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarDay {
    pub date: TradeDate,
    pub is_open: bool,
}

/// Tushare Pro client
pub struct TushareClient {
    client: Client,
    api_url: String,
    token: String,
    rate_limiter: RateLimiter,
    retry_backoffs: Vec<Duration>,
}

impl TushareClient {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_sec))
            .build()?;

        Ok(TushareClient {
            client,
            api_url: config.api_url.clone(),
            token: config.token.clone(),
            rate_limiter: RateLimiter::per_minute(config.requests_per_minute),
            retry_backoffs: config
                .retry_backoffs_sec
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
        })
    }

    /// Override the backoff schedule
    pub fn with_retry_backoffs(mut self, backoffs: Vec<Duration>) -> Self {
        self.retry_backoffs = backoffs;
        self
    }

    /// Call one API with throttling and retries
    async fn query<P: Serialize + Sync>(&self, api_name: &str, params: &P) -> Result<ApiTable> {
        with_retry(api_name, &self.retry_backoffs, || self.query_once(api_name, params)).await
    }

    async fn query_once<P: Serialize + Sync>(&self, api_name: &str, params: &P) -> Result<ApiTable> {
        self.rate_limiter.acquire().await;

        let request = ApiRequest {
            api_name,
            token: &self.token,
            params,
            fields: "",
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SyncError::NetworkTimeout(e.to_string())
                } else {
                    SyncError::HttpError(e)
                }
            })?;

        let response = response.error_for_status()?;
        let body = response.text().await?;
        parse_response(&body)
    }

    /// Open and closed days of `exchange` in `[start, end]`, ascending
    pub async fn trade_cal(&self, exchange: &str, start: TradeDate, end: TradeDate) -> Result<Vec<CalendarDay>> {
        let params = TradeCalParams {
            exchange: exchange.to_string(),
            start_date: start.to_string(),
            end_date: end.to_string(),
        };

        debug!(exchange, %start, %end, "Fetching trade_cal");
        let table = self.query(TRADE_CAL_API, &params).await?;

        let mut days = calendar_days(table);
        days.sort_by_key(|d| d.date);
        info!(exchange, days = days.len(), "Fetched trade calendar");
        Ok(days)
    }
}

/// Check the response envelope and unwrap its table
fn parse_response(body: &str) -> Result<ApiTable> {
    let response: ApiResponse = serde_json::from_str(body)?;

    if response.code != 0 {
        let message = response.msg.unwrap_or_default();
        if response.code == RATE_LIMIT_CODE {
            return Err(SyncError::RateLimitExceeded(message));
        }
        return Err(SyncError::ProviderError {
            code: response.code,
            message,
        });
    }

    Ok(response.data.unwrap_or_default())
}

/// Zip Tushare's column table into records
fn daily_records(table: ApiTable) -> Vec<DailyRecord> {
    table
        .into_rows()
        .filter_map(|mut columns| {
            let code = match columns.remove("ts_code") {
                Some(Value::String(code)) if !code.is_empty() => code,
                other => {
                    debug!(?other, "Skipping row without ts_code");
                    return None;
                }
            };
            let trade_date = match columns.remove("trade_date") {
                Some(Value::String(raw)) => match raw.parse::<TradeDate>() {
                    Ok(date) => date,
                    Err(e) => {
                        debug!(%code, %raw, error = %e, "Skipping row with bad trade_date");
                        return None;
                    }
                },
                other => {
                    debug!(%code, ?other, "Skipping row without trade_date");
                    return None;
                }
            };

            Some(DailyRecord {
                instrument_code: code,
                trade_date,
                fields: columns,
            })
        })
        .collect()
}

/// `is_open` arrives as 0/1, sometimes as a string
fn calendar_days(table: ApiTable) -> Vec<CalendarDay> {
    table
        .into_rows()
        .filter_map(|columns| {
            let date = columns.get("cal_date")?.as_str()?.parse::<TradeDate>().ok()?;
            let is_open = match columns.get("is_open")? {
                Value::Number(n) => n.as_i64()? == 1,
                Value::String(s) => s == "1",
                _ => return None,
            };
            Some(CalendarDay { date, is_open })
        })
        .collect()
}

#[async_trait]
impl RemoteSource for TushareClient {
    async fn fetch_daily(
        &self,
        code: &str,
        start: Option<TradeDate>,
        end: Option<TradeDate>,
    ) -> Result<Vec<DailyRecord>> {
        let params = IndexDailyParams {
            ts_code: code.to_string(),
            start_date: start.map(|d| d.to_string()),
            end_date: end.map(|d| d.to_string()),
        };

        debug!(ts_code = code, start = ?params.start_date, end = ?params.end_date, "Fetching index_daily");
        let table = self.query(INDEX_DAILY_API, &params).await?;
        let records = daily_records(table);

        info!(ts_code = code, rows = records.len(), "Fetched index daily");
        Ok(records)
    }
}
