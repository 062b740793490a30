/// Local wall clock used to derive "today" and the publish cutoff
use chrono::{NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;

use super::TradeDate;

pub trait Clock: Send + Sync {
    /// Current local date and time
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> TradeDate {
        TradeDate::new(self.now().date())
    }
}

/// System clock rendered in the exchange time zone
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        SystemClock { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.tz).naive_local()
    }
}

/// Clock pinned to one instant
pub struct FixedClock {
    now: NaiveDateTime,
}

impl FixedClock {
    pub fn at(date: TradeDate, time: NaiveTime) -> Self {
        FixedClock {
            now: date.date().and_time(time),
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.now
    }
}

/// Latest date whose daily bar is expected to be published.
///
/// Today counts once the local time reaches `cutoff`.
pub fn last_settled_date(clock: &dyn Clock, cutoff: NaiveTime) -> Option<TradeDate> {
    let now = clock.now();
    let today = TradeDate::new(now.date());
    if now.time() >= cutoff {
        Some(today)
    } else {
        today.pred()
    }
}
