pub mod engine;
pub mod freshness;
pub mod report;

pub use engine::{SyncEngine, SyncSettings};
pub use freshness::Coverage;
pub use report::{InitReport, InstrumentInit, UpdateOutcome};
