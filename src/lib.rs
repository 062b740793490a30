pub mod types;
pub mod error;
pub mod time;
pub mod data;
pub mod provider;
pub mod sync;
pub mod config;
pub mod utils;

pub use types::*;
pub use error::{Result, SyncError};
pub use sync::{SyncEngine, SyncSettings, UpdateOutcome};
