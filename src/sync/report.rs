/// Outcomes of initialization and periodic update runs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::time::TradeDate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentInit {
    pub code: String,
    pub fetched: usize,
    pub inserted: usize,
    pub error: Option<String>,
}

/// Summary of one `initialize_all` run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub instruments: Vec<InstrumentInit>,
}

impl InitReport {
    pub fn new() -> Self {
        InitReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            instruments: Vec::new(),
        }
    }

    pub fn total_inserted(&self) -> usize {
        self.instruments.iter().map(|i| i.inserted).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &InstrumentInit> {
        self.instruments.iter().filter(|i| i.error.is_some())
    }

    pub fn is_complete(&self) -> bool {
        self.failures().next().is_none()
    }
}

impl Default for InitReport {
    fn default() -> Self {
        Self::new()
    }
}

/// What `update_daily` did
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Nothing stored for the instrument yet; initialize first
    NoPriorData,
    /// The next trading date is still ahead of today
    NotYetDue { next: TradeDate },
    Fetched {
        from: TradeDate,
        fetched: usize,
        inserted: usize,
    },
    /// Calendar could not place the next date; the watch-list was re-initialized
    Reinitialized(InitReport),
}

impl UpdateOutcome {
    pub fn as_str(&self) -> &str {
        match self {
            UpdateOutcome::NoPriorData => "NO_PRIOR_DATA",
            UpdateOutcome::NotYetDue { .. } => "NOT_YET_DUE",
            UpdateOutcome::Fetched { .. } => "FETCHED",
            UpdateOutcome::Reinitialized(_) => "REINITIALIZED",
        }
    }
}
