/// Calendar diff between expected trading dates and stored dates
use std::collections::BTreeSet;

use crate::time::TradeDate;

/// Result of comparing a requested range with the local store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Coverage {
    /// Every expected trading date is stored
    Complete,
    /// Trading dates the store lacks, ascending
    Missing(Vec<TradeDate>),
    /// Nothing stored for the instrument and no lower bound was requested
    Empty { until: TradeDate },
    /// The calendar stops short of the range. `missing` are the gaps in the
    /// part it could enumerate; `from..=to` is the tail it knows nothing about.
    Undeterminable {
        missing: Vec<TradeDate>,
        from: TradeDate,
        to: TradeDate,
    },
}

impl Coverage {
    pub fn is_complete(&self) -> bool {
        matches!(self, Coverage::Complete)
    }

    /// Smallest remote window that covers every gap, as (start, end).
    /// A None start asks the provider for the full history.
    pub fn fetch_window(&self) -> Option<(Option<TradeDate>, TradeDate)> {
        match self {
            Coverage::Complete => None,
            Coverage::Missing(dates) => {
                let first = *dates.first()?;
                let last = *dates.last()?;
                Some((Some(first), last))
            }
            Coverage::Empty { until } => Some((None, *until)),
            Coverage::Undeterminable { missing, from, to } => {
                let start = missing.first().copied().unwrap_or(*from);
                Some((Some(start), *to))
            }
        }
    }
}

/// Expected dates absent from `present`, in ascending order
pub fn missing_dates<I>(expected: &[TradeDate], present: I) -> Vec<TradeDate>
where
    I: IntoIterator<Item = TradeDate>,
{
    let present: BTreeSet<TradeDate> = present.into_iter().collect();
    let mut missing: Vec<TradeDate> = expected.iter().filter(|d| !present.contains(d)).copied().collect();
    missing.sort();
    missing
}
