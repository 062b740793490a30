/// Centralized error types for index synchronization
use thiserror::Error;

use crate::time::TradeDate;

#[derive(Error, Debug)]
pub enum SyncError {
    // Caller Errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Could not get full data for {code} from {} to {end}", display_start(.start))]
    DataUnavailable {
        code: String,
        start: Option<TradeDate>,
        end: TradeDate,
    },

    // Network Errors
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Network timeout: {0}")]
    NetworkTimeout(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    // Provider Errors
    #[error("Provider API error: {code} - {message}")]
    ProviderError { code: i64, message: String },

    #[error("Deserialization failed: {0}")]
    DeserializationError(#[from] serde_json::Error),

    // Storage Errors
    #[error("File I/O error: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Store error: {0}")]
    StoreError(String),

    // Calendar Errors
    #[error("Calendar error: {0}")]
    CalendarError(String),

    #[error("Instrument not found: {0}")]
    UnknownInstrument(String),

    // Configuration Errors
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

fn display_start(start: &Option<TradeDate>) -> String {
    match start {
        Some(date) => date.to_string(),
        None => "the beginning".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Transient failures worth another attempt against the provider
    pub fn is_recoverable(&self) -> bool {
        match self {
            SyncError::NetworkTimeout(_) | SyncError::RateLimitExceeded(_) => true,
            SyncError::HttpError(e) => {
                e.is_timeout() || e.is_connect() || e.status().map_or(false, |s| s.is_server_error())
            }
            _ => false,
        }
    }

    /// Errors caused by the caller rather than by an adapter
    pub fn is_caller_error(&self) -> bool {
        matches!(self, SyncError::InvalidArgument(_))
    }

    /// Get error code for logging/monitoring
    pub fn error_code(&self) -> &str {
        match self {
            SyncError::InvalidArgument(_) => "ARG_001",
            SyncError::DataUnavailable { .. } => "DATA_001",
            SyncError::HttpError(_) => "NET_001",
            SyncError::NetworkTimeout(_) => "NET_002",
            SyncError::RateLimitExceeded(_) => "NET_003",
            SyncError::ProviderError { .. } => "PROV_001",
            SyncError::DeserializationError(_) => "PROV_002",
            SyncError::FileError(_) => "STORE_001",
            SyncError::StoreError(_) => "STORE_002",
            SyncError::CalendarError(_) => "CAL_001",
            SyncError::UnknownInstrument(_) => "CAL_002",
            SyncError::ConfigError(_) => "CFG_001",
        }
    }
}
