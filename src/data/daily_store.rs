/// Daily record storage - in-memory index (BTreeMap) + JSONL on disk
/// One append-only file per instrument
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::DailyStore;
use crate::error::{Result, SyncError};
use crate::time::TradeDate;
use crate::types::DailyRecord;

type Series = BTreeMap<TradeDate, DailyRecord>;

/// JSONL-backed daily store.
///
/// Each instrument's file is read into memory the first time the instrument
/// is touched. Writes append to the file before the in-memory index is
/// updated, so a failed write leaves the index unchanged.
pub struct JsonlDailyStore {
    dir: PathBuf,
    series: Arc<RwLock<HashMap<String, Series>>>,
}

impl JsonlDailyStore {
    pub async fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        Ok(JsonlDailyStore {
            dir,
            series: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// File holding one instrument, e.g. `000001.SH.jsonl`
    fn file_for(&self, code: &str) -> Result<PathBuf> {
        if code.is_empty() || code.contains(['/', '\\']) || code.starts_with('.') {
            return Err(SyncError::StoreError(format!("Unusable instrument code for file name: {:?}", code)));
        }
        Ok(self.dir.join(format!("{}.jsonl", code)))
    }

    /// Load an instrument's file into the index if it is not loaded yet
    async fn ensure_loaded(&self, code: &str) -> Result<()> {
        if self.series.read().await.contains_key(code) {
            return Ok(());
        }

        let mut series = self.series.write().await;
        if series.contains_key(code) {
            return Ok(());
        }

        let loaded = self.load_from_disk(code).await?;
        series.insert(code.to_string(), loaded);
        Ok(())
    }

    async fn load_from_disk(&self, code: &str) -> Result<Series> {
        let path = self.file_for(code)?;
        let mut loaded = Series::new();

        if !path.exists() {
            debug!("No existing disk file for {}", code);
            return Ok(loaded);
        }

        let file = tokio::fs::File::open(&path).await?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let mut skipped = 0usize;
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DailyRecord>(&line) {
                Ok(record) if record.instrument_code == code => {
                    loaded.entry(record.trade_date).or_insert(record);
                }
                _ => skipped += 1,
            }
        }

        if skipped > 0 {
            warn!("Skipped {} unreadable lines in {}", skipped, path.display());
        }
        debug!("Loaded {} records for {} from disk", loaded.len(), code);

        Ok(loaded)
    }

    async fn append_to_disk(&self, code: &str, records: &[&DailyRecord]) -> Result<()> {
        let mut buffer = String::new();
        for record in records {
            buffer.push_str(&serde_json::to_string(record)?);
            buffer.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_for(code)?)
            .await?;
        file.write_all(buffer.as_bytes()).await?;
        file.sync_all().await?;

        Ok(())
    }

    /// Number of stored records for `code`
    pub async fn count(&self, code: &str) -> Result<usize> {
        self.ensure_loaded(code).await?;
        let series = self.series.read().await;
        Ok(series.get(code).map_or(0, |s| s.len()))
    }
}

#[async_trait]
impl DailyStore for JsonlDailyStore {
    async fn insert_many(&self, records: Vec<DailyRecord>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut by_code: BTreeMap<String, Vec<DailyRecord>> = BTreeMap::new();
        for record in records {
            by_code.entry(record.instrument_code.clone()).or_default().push(record);
        }

        let mut inserted = 0;
        for (code, batch) in by_code {
            self.ensure_loaded(&code).await?;

            let mut series = self.series.write().await;
            let existing = series.entry(code.clone()).or_default();

            // First occurrence wins, both against the store and within the batch
            let mut fresh: BTreeMap<TradeDate, DailyRecord> = BTreeMap::new();
            for record in batch {
                if !existing.contains_key(&record.trade_date) {
                    fresh.entry(record.trade_date).or_insert(record);
                }
            }
            if fresh.is_empty() {
                debug!("Nothing new for {}", code);
                continue;
            }

            let refs: Vec<&DailyRecord> = fresh.values().collect();
            self.append_to_disk(&code, &refs).await?;

            inserted += fresh.len();
            existing.extend(fresh);

            debug!("Stored records for {} - total: {}", code, existing.len());
        }

        Ok(inserted)
    }

    async fn query_range(
        &self,
        code: &str,
        start: Option<TradeDate>,
        end: TradeDate,
    ) -> Result<Vec<DailyRecord>> {
        if matches!(start, Some(s) if s > end) {
            return Ok(Vec::new());
        }

        self.ensure_loaded(code).await?;
        let series = self.series.read().await;
        let Some(records) = series.get(code) else {
            return Ok(Vec::new());
        };

        let selected = match start {
            Some(start) => records.range(start..=end),
            None => records.range(..=end),
        };
        Ok(selected.rev().map(|(_, r)| r.clone()).collect())
    }

    async fn latest(&self, code: &str) -> Result<Option<DailyRecord>> {
        self.ensure_loaded(code).await?;
        let series = self.series.read().await;
        Ok(series.get(code).and_then(|s| s.values().next_back().cloned()))
    }

    async fn earliest(&self, code: &str) -> Result<Option<DailyRecord>> {
        self.ensure_loaded(code).await?;
        let series = self.series.read().await;
        Ok(series.get(code).and_then(|s| s.values().next().cloned()))
    }
}
