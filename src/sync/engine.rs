/// Index daily synchronization: initialization, freshness reconciliation,
/// delta fetch and periodic update over the remote, store and calendar adapters
use chrono::{NaiveTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::freshness::{missing_dates, Coverage};
use super::report::{InitReport, InstrumentInit, UpdateOutcome};
use crate::data::{DailyStore, JsonlDailyStore};
use crate::error::{Result, SyncError};
use crate::provider::{RemoteSource, TushareCalendar, TushareClient};
use crate::time::{
    last_settled_date, walk_trading_dates, Clock, ExchangeDirectory, HolidayCalendar, SystemClock, TradeCalendar,
    TradeDate,
};
use crate::types::{CalendarSource, Config, DailyRecord, WatchedInstrument};

/// Engine settings derived from configuration
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub watch_list: Vec<WatchedInstrument>,
    pub benchmark: String,
    pub publish_cutoff: NaiveTime,
    /// Where init reports are written; None disables them
    pub report_dir: Option<PathBuf>,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        let publish_cutoff = config
            .publish_cutoff_time()
            .ok_or_else(|| SyncError::ConfigError(format!("Invalid publish_cutoff: {}", config.publish_cutoff)))?;

        Ok(SyncSettings {
            watch_list: config.watch_list.clone(),
            benchmark: config.benchmark.clone(),
            publish_cutoff,
            report_dir: Some(PathBuf::from(&config.data_dir).join("reports")),
        })
    }
}

pub struct SyncEngine {
    remote: Arc<dyn RemoteSource>,
    store: Arc<dyn DailyStore>,
    calendar: Arc<dyn TradeCalendar>,
    clock: Arc<dyn Clock>,
    settings: SyncSettings,
}

impl SyncEngine {
    pub fn new(
        remote: Arc<dyn RemoteSource>,
        store: Arc<dyn DailyStore>,
        calendar: Arc<dyn TradeCalendar>,
        clock: Arc<dyn Clock>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            remote,
            store,
            calendar,
            clock,
            settings,
        }
    }

    /// Wire the production adapters: Tushare, JSONL store, configured calendar
    pub async fn from_config(config: &Config) -> Result<Self> {
        let tz = config
            .tz()
            .ok_or_else(|| SyncError::ConfigError(format!("Unknown timezone: {}", config.timezone)))?;

        // Calendar and daily bars share one client and its rate limit
        let remote = Arc::new(TushareClient::new(&config.provider)?);
        let store = Arc::new(JsonlDailyStore::open(PathBuf::from(&config.data_dir).join("daily")).await?);
        let calendar: Arc<dyn TradeCalendar> = match config.calendar {
            CalendarSource::Tushare => Arc::new(TushareCalendar::new(
                remote.clone(),
                ExchangeDirectory::new(&config.exchanges, &config.watch_list),
            )),
            CalendarSource::Holidays => Arc::new(HolidayCalendar::new(&config.exchanges, &config.watch_list)),
        };
        let clock = Arc::new(SystemClock::new(tz));

        Ok(Self::new(remote, store, calendar, clock, SyncSettings::from_config(config)?))
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Full backfill of every watched instrument.
    ///
    /// Instruments are independent: a failure is logged and recorded in the
    /// report, and the remaining instruments still run.
    #[instrument(skip(self))]
    pub async fn initialize_all(&self) -> InitReport {
        let mut report = InitReport::new();
        info!("📊 Initializing {} watched indices", self.settings.watch_list.len());

        for watched in &self.settings.watch_list {
            debug!("Initializing index: {}", watched.code);

            let entry = match self.initialize_one(&watched.code).await {
                Ok((fetched, inserted)) => {
                    info!(code = %watched.code, fetched, inserted, "✅ Index initialized");
                    InstrumentInit {
                        code: watched.code.clone(),
                        fetched,
                        inserted,
                        error: None,
                    }
                }
                Err(e) => {
                    error!(code = %watched.code, error = %e, error_code = e.error_code(), "❌ Failed to initialize index");
                    InstrumentInit {
                        code: watched.code.clone(),
                        fetched: 0,
                        inserted: 0,
                        error: Some(e.to_string()),
                    }
                }
            };
            report.instruments.push(entry);
        }

        report.finished_at = Some(Utc::now());

        if let Err(e) = self.save_init_report(&report).await {
            warn!("Could not save init report: {}", e);
        }

        let failed = report.failures().count();
        if failed > 0 {
            warn!("Initialization finished with {} failed indices", failed);
        } else {
            info!("✅ Initialization finished, {} records stored", report.total_inserted());
        }

        report
    }

    async fn initialize_one(&self, code: &str) -> Result<(usize, usize)> {
        let records = self.remote.fetch_daily(code, None, None).await?;
        let records = keep_requested(code, records);
        let fetched = records.len();
        let inserted = self.save_records(records).await?;
        Ok((fetched, inserted))
    }

    /// Persist fetched records; an empty batch is logged and skipped
    async fn save_records(&self, records: Vec<DailyRecord>) -> Result<usize> {
        if records.is_empty() {
            warn!("No data saved to store, provider returned nothing");
            return Ok(0);
        }
        self.store.insert_many(records).await
    }

    async fn save_init_report(&self, report: &InitReport) -> Result<()> {
        let Some(dir) = &self.settings.report_dir else {
            return Ok(());
        };

        tokio::fs::create_dir_all(dir).await?;
        let filename = dir.join(format!(
            "init_report_{}.json",
            report.started_at.format("%Y%m%d_%H%M%S")
        ));

        let json = serde_json::to_string_pretty(report)?;
        tokio::fs::write(&filename, json).await?;

        info!("💾 Saved init report to {}", filename.display());
        Ok(())
    }

    /// Daily records of `code` in `[start, end]`, newest first.
    ///
    /// `end` defaults to today on the local clock. Missing trading days are
    /// fetched from the provider before the store is read.
    #[instrument(skip(self))]
    pub async fn get_daily(
        &self,
        code: &str,
        start: Option<TradeDate>,
        end: Option<TradeDate>,
    ) -> Result<Vec<DailyRecord>> {
        if code.trim().is_empty() {
            return Err(SyncError::InvalidArgument("Index code is empty".to_string()));
        }
        let end = end.unwrap_or_else(|| self.clock.today());
        if let Some(start) = start {
            if start > end {
                return Err(SyncError::InvalidArgument(format!(
                    "start must not exceed end ({} > {})",
                    start, end
                )));
            }
        }

        if !self.is_data_available(code, start, end).await? {
            debug!("Not all data available for {}", code);
            if !self.obtain_delta_data(code, start, end).await? {
                warn!("Failed to obtain data for {}", code);
                return Err(SyncError::DataUnavailable {
                    code: code.to_string(),
                    start,
                    end,
                });
            }
        }

        let records = self.store.query_range(code, start, end).await?;
        debug!(code, returned = records.len(), "Daily records returned");
        Ok(records)
    }

    /// String entry point: empty strings count as absent dates
    pub async fn get_daily_str(&self, code: &str, start: &str, end: &str) -> Result<Vec<DailyRecord>> {
        let start = parse_optional_date(start)?;
        let end = parse_optional_date(end)?;
        self.get_daily(code, start, end).await
    }

    /// True if the store holds every trading day of `code` in the range
    pub async fn is_data_available(&self, code: &str, start: Option<TradeDate>, end: TradeDate) -> Result<bool> {
        let coverage = self.coverage(code, start, end).await?;
        if let Coverage::Undeterminable { from, to, .. } = &coverage {
            warn!(code, %from, %to, "Calendar cannot enumerate range tail, treating it as stale");
        }
        Ok(coverage.is_complete())
    }

    /// Compare the expected trading dates of the range with stored dates
    async fn coverage(&self, code: &str, start: Option<TradeDate>, end: TradeDate) -> Result<Coverage> {
        let Some(settled) = last_settled_date(self.clock.as_ref(), self.settings.publish_cutoff) else {
            return Ok(Coverage::Complete);
        };
        let end = end.min(settled);

        let start = match start {
            Some(start) => start,
            None => match self.store.earliest(code).await? {
                Some(first) => first.trade_date,
                None => return Ok(Coverage::Empty { until: end }),
            },
        };
        if start > end {
            return Ok(Coverage::Complete);
        }

        let exchange = self.calendar.exchange_of(code).await?;
        let expected = walk_trading_dates(self.calendar.as_ref(), &exchange, start, end).await?;

        let present = self.store.query_range(code, Some(start), end).await?;
        let missing = missing_dates(&expected.dates, present.into_iter().map(|r| r.trade_date));

        if let Some(from) = expected.unknown_from {
            return Ok(Coverage::Undeterminable { missing, from, to: end });
        }
        if missing.is_empty() {
            Ok(Coverage::Complete)
        } else {
            debug!(code, missing = missing.len(), expected = expected.dates.len(), "Gaps found");
            Ok(Coverage::Missing(missing))
        }
    }

    /// Fetch only the uncovered part of the range and store it.
    ///
    /// Returns false if the provider failed or the range is still incomplete
    /// afterwards. Trading days before the first stored record (before the
    /// index was published) do not count as gaps.
    #[instrument(skip(self))]
    pub async fn obtain_delta_data(&self, code: &str, start: Option<TradeDate>, end: TradeDate) -> Result<bool> {
        let coverage = self.coverage(code, start, end).await?;
        let Some((from, to)) = coverage.fetch_window() else {
            return Ok(true);
        };

        info!(
            code,
            from = ?from.map(|d| d.to_string()),
            to = %to,
            "Fetching delta from provider"
        );

        let records = match self.remote.fetch_daily(code, from, Some(to)).await {
            Ok(records) => keep_requested(code, records),
            Err(e) => {
                warn!(code, error = %e, error_code = e.error_code(), "Delta fetch failed");
                return Ok(false);
            }
        };
        let fetched = records.len();
        let inserted = self.save_records(records).await?;
        debug!(code, fetched, inserted, "Delta stored");

        let Some(first) = self.store.earliest(code).await? else {
            warn!(code, "Provider has no data for index");
            return Ok(false);
        };
        let verify_from = match start {
            Some(start) if start > first.trade_date => start,
            _ => first.trade_date,
        };

        match self.coverage(code, Some(verify_from), end).await? {
            Coverage::Complete => Ok(true),
            Coverage::Missing(dates) => {
                warn!(
                    code,
                    missing = dates.len(),
                    first_missing = ?dates.first().map(|d| d.to_string()),
                    "Provider did not fill every trading day"
                );
                Ok(false)
            }
            Coverage::Undeterminable { missing, .. } => {
                // Past the calendar's reach the provider's answer is taken as is
                if !missing.is_empty() {
                    warn!(code, missing = missing.len(), "Provider did not fill every trading day");
                }
                Ok(missing.is_empty())
            }
            Coverage::Empty { .. } => Ok(false),
        }
    }

    /// Periodic update of one index, anchored on its latest stored date.
    ///
    /// `code` defaults to the configured benchmark.
    #[instrument(skip(self))]
    pub async fn update_daily(&self, code: Option<&str>) -> Result<UpdateOutcome> {
        let code = code.unwrap_or(&self.settings.benchmark);
        if code.trim().is_empty() {
            return Err(SyncError::InvalidArgument("Index code is empty".to_string()));
        }

        let Some(latest) = self.store.latest(code).await? else {
            warn!("No index found for {}, initialize it first, nothing done", code);
            return Ok(UpdateOutcome::NoPriorData);
        };

        let exchange = self.calendar.exchange_of(code).await?;
        let next = self.calendar.next_trading_date(&exchange, latest.trade_date).await?;
        debug!(code, latest = %latest.trade_date, next = ?next.map(|d| d.to_string()), "Update window");

        let Some(next) = next else {
            warn!("Could not determine next trading date for {}, re-init index daily", code);
            let report = self.initialize_all().await;
            return Ok(UpdateOutcome::Reinitialized(report));
        };

        let today = self.clock.today();
        if next > today {
            warn!("Could not get index in future {}", next);
            return Ok(UpdateOutcome::NotYetDue { next });
        }

        let records = keep_requested(code, self.remote.fetch_daily(code, Some(next), Some(today)).await?);
        let fetched = records.len();
        let inserted = self.save_records(records).await?;

        info!(code, from = %next, fetched, inserted, "Index daily updated");
        Ok(UpdateOutcome::Fetched {
            from: next,
            fetched,
            inserted,
        })
    }
}

fn parse_optional_date(raw: &str) -> Result<Option<TradeDate>> {
    let raw = raw.trim();
    if raw.is_empty() {
        Ok(None)
    } else {
        raw.parse().map(Some)
    }
}

/// Drop rows the provider returned for a different instrument
fn keep_requested(code: &str, records: Vec<DailyRecord>) -> Vec<DailyRecord> {
    let total = records.len();
    let kept: Vec<DailyRecord> = records.into_iter().filter(|r| r.instrument_code == code).collect();
    if kept.len() != total {
        warn!(code, dropped = total - kept.len(), "Provider returned rows for other instruments");
    }
    kept
}
