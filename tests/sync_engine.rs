use async_trait::async_trait;
use chrono::NaiveTime;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use indexsync::data::{DailyStore, JsonlDailyStore};
use indexsync::provider::RemoteSource;
use indexsync::time::{walk_trading_dates, FixedClock, HolidayCalendar, TradeDate};
use indexsync::{
    DailyRecord, ExchangeCalendarConfig, Result, SyncEngine, SyncError, SyncSettings, UpdateOutcome,
    WatchedInstrument,
};

type Call = (String, Option<TradeDate>, Option<TradeDate>);

/// Provider stand-in serving a fixed dataset, newest first
#[derive(Default)]
struct FakeRemote {
    rows: Mutex<Vec<DailyRecord>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeRemote {
    fn with_rows(rows: Vec<DailyRecord>) -> Self {
        FakeRemote {
            rows: Mutex::new(rows),
            ..Default::default()
        }
    }

    fn fail_for(&self, code: &str) {
        self.failing.lock().unwrap().insert(code.to_string());
    }

    fn add_rows(&self, rows: Vec<DailyRecord>) {
        self.rows.lock().unwrap().extend(rows);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteSource for FakeRemote {
    async fn fetch_daily(
        &self,
        code: &str,
        start: Option<TradeDate>,
        end: Option<TradeDate>,
    ) -> Result<Vec<DailyRecord>> {
        self.calls.lock().unwrap().push((code.to_string(), start, end));

        if self.failing.lock().unwrap().contains(code) {
            return Err(SyncError::ProviderError {
                code: 2002,
                message: "no permission".to_string(),
            });
        }

        let mut rows: Vec<DailyRecord> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.instrument_code == code)
            .filter(|r| start.map_or(true, |s| r.trade_date >= s))
            .filter(|r| end.map_or(true, |e| r.trade_date <= e))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.trade_date.cmp(&a.trade_date));
        Ok(rows)
    }
}

fn d(s: &str) -> TradeDate {
    s.parse().unwrap()
}

fn exchanges() -> Vec<ExchangeCalendarConfig> {
    let holidays: Vec<TradeDate> = [
        "20200101", "20200124", "20200127", "20200128", "20200129", "20200130", "20200131",
        "20200406", "20200501", "20200504", "20200505", "20200625", "20200626", "20201001",
        "20201002", "20201005", "20201006", "20201007", "20201008",
    ]
    .iter()
    .map(|s| d(s))
    .collect();

    vec![
        ExchangeCalendarConfig {
            code: "SSE".to_string(),
            suffix: "SH".to_string(),
            covered_from: d("20191201"),
            covered_until: d("20201231"),
            holidays: holidays.clone(),
        },
        ExchangeCalendarConfig {
            code: "SZSE".to_string(),
            suffix: "SZ".to_string(),
            covered_from: d("20191201"),
            covered_until: d("20201231"),
            holidays,
        },
    ]
}

fn watch_list() -> Vec<WatchedInstrument> {
    vec![
        WatchedInstrument {
            code: "000001.SH".to_string(),
            exchange: "SSE".to_string(),
        },
        WatchedInstrument {
            code: "399006.SZ".to_string(),
            exchange: "SZSE".to_string(),
        },
    ]
}

fn calendar() -> HolidayCalendar {
    HolidayCalendar::new(&exchanges(), &watch_list())
}

/// One record per trading day of `code` in `[from, to]`
async fn history(code: &str, exchange: &str, from: &str, to: &str) -> Vec<DailyRecord> {
    let cal = calendar();
    let days = walk_trading_dates(&cal, exchange, d(from), d(to)).await.unwrap();
    assert_eq!(days.unknown_from, None, "fixture range {}..{} outside calendar", from, to);
    days.dates
        .into_iter()
        .enumerate()
        .map(|(i, date)| DailyRecord::new(code, date).with_field("close", 3000.0 + i as f64))
        .collect()
}

struct Harness {
    engine: SyncEngine,
    remote: Arc<FakeRemote>,
    store: Arc<JsonlDailyStore>,
    _dir: tempfile::TempDir,
}

/// Engine over a fresh store with the local clock at `today` 18:00
async fn harness(rows: Vec<DailyRecord>, today: &str) -> Harness {
    harness_at(rows, today, NaiveTime::from_hms_opt(18, 0, 0).unwrap()).await
}

async fn harness_at(rows: Vec<DailyRecord>, today: &str, time: NaiveTime) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonlDailyStore::open(dir.path()).await.unwrap());
    let remote = Arc::new(FakeRemote::with_rows(rows));
    let settings = SyncSettings {
        watch_list: watch_list(),
        benchmark: "000001.SH".to_string(),
        publish_cutoff: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        report_dir: None,
    };

    let engine = SyncEngine::new(
        remote.clone(),
        store.clone(),
        Arc::new(calendar()),
        Arc::new(FixedClock::at(d(today), time)),
        settings,
    );

    Harness {
        engine,
        remote,
        store,
        _dir: dir,
    }
}

fn dates_of(records: &[DailyRecord]) -> Vec<String> {
    records.iter().map(|r| r.trade_date.to_string()).collect()
}

#[tokio::test]
async fn empty_code_is_rejected_without_io() {
    let h = harness(Vec::new(), "20200110").await;

    for code in ["", "   "] {
        let err = h.engine.get_daily(code, None, None).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidArgument(_)));
    }
    assert!(h.remote.calls().is_empty());
}

#[tokio::test]
async fn inverted_range_is_rejected() {
    let h = harness(Vec::new(), "20200110").await;

    let err = h
        .engine
        .get_daily("000001.SH", Some(d("20200110")), Some(d("20200101")))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::InvalidArgument(ref m) if m.contains("start must not exceed end")));

    // Start after the defaulted end (today)
    let err = h.engine.get_daily("000001.SH", Some(d("20200201")), None).await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidArgument(_)));

    let err = h.engine.get_daily_str("000001.SH", "2020-01-01", "").await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidArgument(_)));
    assert!(h.remote.calls().is_empty());
}

#[tokio::test]
async fn empty_store_triggers_one_bounded_delta_fetch() {
    let rows = history("000001.SH", "SSE", "20191202", "20200117").await;
    let h = harness(rows, "20200117").await;

    let records = h
        .engine
        .get_daily("000001.SH", Some(d("20200101")), Some(d("20200110")))
        .await
        .unwrap();

    assert_eq!(
        h.remote.calls(),
        vec![("000001.SH".to_string(), Some(d("20200102")), Some(d("20200110")))]
    );
    assert_eq!(
        dates_of(&records),
        vec!["20200110", "20200109", "20200108", "20200107", "20200106", "20200103", "20200102"]
    );
    assert!(records.iter().all(|r| r.instrument_code == "000001.SH"));

    // Second read is served locally
    let again = h
        .engine
        .get_daily_str("000001.SH", "20200101", "20200110")
        .await
        .unwrap();
    assert_eq!(again, records);
    assert_eq!(h.remote.calls().len(), 1);
}

#[tokio::test]
async fn gap_fetch_is_limited_to_missing_span() {
    let rows = history("000001.SH", "SSE", "20200102", "20200117").await;
    let h = harness(rows.clone(), "20200117").await;

    let keep: Vec<DailyRecord> = rows
        .into_iter()
        .filter(|r| !["20200106", "20200107", "20200108"].contains(&r.trade_date.to_string().as_str()))
        .collect();
    h.store.insert_many(keep).await.unwrap();

    assert!(!h
        .engine
        .is_data_available("000001.SH", Some(d("20200102")), d("20200117"))
        .await
        .unwrap());

    let records = h
        .engine
        .get_daily("000001.SH", Some(d("20200102")), Some(d("20200117")))
        .await
        .unwrap();

    assert_eq!(
        h.remote.calls(),
        vec![("000001.SH".to_string(), Some(d("20200106")), Some(d("20200108")))]
    );
    assert_eq!(records.len(), 12);
    assert_eq!(h.store.count("000001.SH").await.unwrap(), 12);
}

#[tokio::test]
async fn default_end_is_today_and_bounds_results() {
    let mut rows = history("399006.SZ", "SZSE", "20200102", "20200110").await;
    // Provider row dated after the local today
    rows.push(DailyRecord::new("399006.SZ", d("20200113")));
    let h = harness(rows, "20200110").await;

    let records = h.engine.get_daily("399006.SZ", None, None).await.unwrap();

    // Empty store and no start: full history up to today
    assert_eq!(h.remote.calls(), vec![("399006.SZ".to_string(), None, Some(d("20200110")))]);
    assert_eq!(records.len(), 7);
    assert!(records.iter().all(|r| r.trade_date <= d("20200110")));
    assert_eq!(records[0].trade_date, d("20200110"));
}

#[tokio::test]
async fn todays_bar_is_not_required_before_cutoff() {
    let rows = history("000001.SH", "SSE", "20200102", "20200109").await;
    let h = harness_at(rows, "20200110", NaiveTime::from_hms_opt(10, 0, 0).unwrap()).await;

    let records = h
        .engine
        .get_daily("000001.SH", Some(d("20200102")), None)
        .await
        .unwrap();
    assert_eq!(records.len(), 6);
    assert_eq!(h.remote.calls().len(), 1);

    // Range is complete up to yesterday, nothing more to fetch
    h.engine
        .get_daily("000001.SH", Some(d("20200102")), None)
        .await
        .unwrap();
    assert_eq!(h.remote.calls().len(), 1);
}

#[tokio::test]
async fn provider_gap_surfaces_data_unavailable() {
    let rows: Vec<DailyRecord> = history("000001.SH", "SSE", "20200102", "20200110")
        .await
        .into_iter()
        .filter(|r| r.trade_date != d("20200107"))
        .collect();
    let h = harness(rows, "20200110").await;

    let err = h
        .engine
        .get_daily("000001.SH", Some(d("20200102")), Some(d("20200110")))
        .await
        .unwrap_err();

    match err {
        SyncError::DataUnavailable { code, start, end } => {
            assert_eq!(code, "000001.SH");
            assert_eq!(start, Some(d("20200102")));
            assert_eq!(end, d("20200110"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn remote_failure_during_delta_is_data_unavailable() {
    let h = harness(Vec::new(), "20200110").await;
    h.remote.fail_for("000001.SH");

    let err = h
        .engine
        .get_daily("000001.SH", Some(d("20200102")), Some(d("20200110")))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::DataUnavailable { .. }));
    assert!(!h
        .engine
        .obtain_delta_data("000001.SH", Some(d("20200102")), d("20200110"))
        .await
        .unwrap());
}

#[tokio::test]
async fn days_before_first_listing_are_not_gaps() {
    // Index published from 2020-01-06 only
    let rows = history("399006.SZ", "SZSE", "20200106", "20200110").await;
    let h = harness(rows, "20200110").await;

    let records = h
        .engine
        .get_daily("399006.SZ", Some(d("20200102")), Some(d("20200110")))
        .await
        .unwrap();
    assert_eq!(records.len(), 5);
}

#[tokio::test]
async fn delta_fetched_day_round_trips() {
    let rows = history("000001.SH", "SSE", "20201102", "20201117").await;
    let h = harness(rows, "20201117").await;

    assert!(h
        .engine
        .obtain_delta_data("000001.SH", Some(d("20201116")), d("20201116"))
        .await
        .unwrap());

    let records = h
        .engine
        .get_daily("000001.SH", Some(d("20201116")), Some(d("20201116")))
        .await
        .unwrap();
    assert_eq!(dates_of(&records), vec!["20201116"]);
    assert_eq!(h.remote.calls().len(), 1);
}

#[tokio::test]
async fn stored_range_ending_on_last_calendar_day_is_fresh() {
    let rows = history("000001.SH", "SSE", "20201228", "20201231").await;
    assert_eq!(rows.len(), 4);
    let h = harness(rows.clone(), "20201231").await;
    h.store.insert_many(rows).await.unwrap();

    assert!(h
        .engine
        .is_data_available("000001.SH", Some(d("20201228")), d("20201231"))
        .await
        .unwrap());

    for _ in 0..3 {
        let records = h
            .engine
            .get_daily("000001.SH", Some(d("20201228")), Some(d("20201231")))
            .await
            .unwrap();
        assert_eq!(records.len(), 4);
    }
    assert!(h.remote.calls().is_empty());
}

#[tokio::test]
async fn range_past_calendar_fetches_only_uncovered_tail() {
    let stored = history("000001.SH", "SSE", "20201201", "20201231").await;
    let h = harness(Vec::new(), "20210108").await;
    h.store.insert_many(stored.clone()).await.unwrap();
    h.remote.add_rows(
        ["20210104", "20210105", "20210106", "20210107", "20210108"]
            .iter()
            .map(|s| DailyRecord::new("000001.SH", d(s)))
            .collect(),
    );

    let records = h
        .engine
        .get_daily("000001.SH", Some(d("20201201")), Some(d("20210108")))
        .await
        .unwrap();

    assert_eq!(
        h.remote.calls(),
        vec![("000001.SH".to_string(), Some(d("20210101")), Some(d("20210108")))]
    );
    assert_eq!(records.len(), stored.len() + 5);
    assert_eq!(records[0].trade_date, d("20210108"));
}

#[tokio::test]
async fn gap_inside_calendar_widens_tail_fetch() {
    let stored: Vec<DailyRecord> = history("000001.SH", "SSE", "20201221", "20201231")
        .await
        .into_iter()
        .filter(|r| r.trade_date != d("20201229"))
        .collect();
    let h = harness(history("000001.SH", "SSE", "20201229", "20201229").await, "20210105").await;
    h.store.insert_many(stored).await.unwrap();

    let records = h
        .engine
        .get_daily("000001.SH", Some(d("20201221")), Some(d("20210105")))
        .await
        .unwrap();

    assert_eq!(
        h.remote.calls(),
        vec![("000001.SH".to_string(), Some(d("20201229")), Some(d("20210105")))]
    );
    assert_eq!(records.len(), 9);
}

#[tokio::test]
async fn initialize_all_twice_keeps_pairs_unique() {
    let mut rows = history("000001.SH", "SSE", "20200102", "20200117").await;
    rows.extend(history("399006.SZ", "SZSE", "20200102", "20200117").await);
    let h = harness(rows, "20200117").await;

    let first = h.engine.initialize_all().await;
    assert!(first.is_complete());
    assert_eq!(first.total_inserted(), 24);

    let second = h.engine.initialize_all().await;
    assert!(second.is_complete());
    assert_eq!(second.total_inserted(), 0);
    assert_eq!(second.instruments[0].fetched, 12);

    for code in ["000001.SH", "399006.SZ"] {
        let stored = h.store.query_range(code, None, d("20201231")).await.unwrap();
        let unique: HashSet<TradeDate> = stored.iter().map(|r| r.trade_date).collect();
        assert_eq!(stored.len(), 12);
        assert_eq!(unique.len(), stored.len());
    }
}

#[tokio::test]
async fn initialize_all_isolates_failures() {
    let rows = history("399006.SZ", "SZSE", "20200102", "20200110").await;
    let h = harness(rows, "20200110").await;
    h.remote.fail_for("000001.SH");

    let report = h.engine.initialize_all().await;

    assert!(!report.is_complete());
    let failed: Vec<&str> = report.failures().map(|i| i.code.as_str()).collect();
    assert_eq!(failed, vec!["000001.SH"]);
    assert_eq!(report.instruments[1].inserted, 7);
    assert_eq!(h.remote.calls().len(), 2);
}

#[tokio::test]
async fn initialize_all_with_empty_provider_is_noop() {
    let h = harness(Vec::new(), "20200110").await;

    let report = h.engine.initialize_all().await;
    assert!(report.is_complete());
    assert_eq!(report.total_inserted(), 0);
    assert!(h.store.latest("000001.SH").await.unwrap().is_none());
}

#[tokio::test]
async fn update_without_prior_data_does_nothing() {
    let rows = history("000001.SH", "SSE", "20201102", "20201117").await;
    let h = harness(rows, "20201117").await;

    let outcome = h.engine.update_daily(Some("000001.SH")).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::NoPriorData);
    assert!(h.remote.calls().is_empty());
}

#[tokio::test]
async fn update_skips_when_next_date_is_in_future() {
    let rows = history("000001.SH", "SSE", "20201102", "20201116").await;
    let h = harness(rows.clone(), "20201116").await;
    h.store.insert_many(rows).await.unwrap();

    // Benchmark by default
    let outcome = h.engine.update_daily(None).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::NotYetDue { next: d("20201117") });
    assert!(h.remote.calls().is_empty());
}

#[tokio::test]
async fn update_appends_from_next_trading_date() {
    let stored = history("000001.SH", "SSE", "20201102", "20201116").await;
    let h = harness(stored.clone(), "20201117").await;
    h.store.insert_many(stored.clone()).await.unwrap();
    h.remote.add_rows(vec![DailyRecord::new("000001.SH", d("20201117")).with_field("close", 3339.9)]);

    let outcome = h.engine.update_daily(Some("000001.SH")).await.unwrap();

    assert_eq!(
        outcome,
        UpdateOutcome::Fetched {
            from: d("20201117"),
            fetched: 1,
            inserted: 1,
        }
    );
    assert_eq!(
        h.remote.calls(),
        vec![("000001.SH".to_string(), Some(d("20201117")), Some(d("20201117")))]
    );

    let all = h.store.query_range("000001.SH", None, d("20201231")).await.unwrap();
    assert_eq!(all.len(), stored.len() + 1);
    assert_eq!(all[0].trade_date, d("20201117"));
}

#[tokio::test]
async fn update_after_weekend_starts_monday() {
    // Latest stored Friday 2020-11-13, today Monday evening
    let stored = history("399006.SZ", "SZSE", "20201109", "20201113").await;
    let h = harness(Vec::new(), "20201116").await;
    h.store.insert_many(stored).await.unwrap();

    let outcome = h.engine.update_daily(Some("399006.SZ")).await.unwrap();
    assert!(matches!(outcome, UpdateOutcome::Fetched { from, fetched: 0, .. } if from == d("20201116")));
}

#[tokio::test]
async fn update_reinitializes_when_calendar_runs_out() {
    let stored = vec![DailyRecord::new("000001.SH", d("20201231"))];
    let h = harness(history("399006.SZ", "SZSE", "20201228", "20201231").await, "20210105").await;
    h.store.insert_many(stored).await.unwrap();

    let outcome = h.engine.update_daily(Some("000001.SH")).await.unwrap();

    match outcome {
        UpdateOutcome::Reinitialized(report) => {
            assert_eq!(report.instruments.len(), 2);
            assert_eq!(report.total_inserted(), 4);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(h.remote.calls().len(), 2);
}

#[tokio::test]
async fn update_propagates_unknown_instrument() {
    let h = harness(Vec::new(), "20201117").await;
    h.store.insert_many(vec![DailyRecord::new("AAPL", d("20201116"))]).await.unwrap();

    let err = h.engine.update_daily(Some("AAPL")).await.unwrap_err();
    assert!(matches!(err, SyncError::UnknownInstrument(_)));
}
