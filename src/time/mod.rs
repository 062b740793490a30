pub mod calendar;
pub mod clock;
pub mod trade_date;

pub use calendar::{walk_trading_dates, ExchangeDirectory, HolidayCalendar, TradeCalendar, TradingDays};
pub use clock::{last_settled_date, Clock, FixedClock, SystemClock};
pub use trade_date::TradeDate;
