use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("feed request failed: {0}")]
    Http(String),

    #[error("malformed feed: {0}")]
    Feed(String),

    #[error("feed entry {entry_id}: {field} {reason}")]
    InvalidField {
        entry_id: u64,
        field: &'static str,
        reason: String,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("reading not found: {0}")]
    NotFound(i64),

    #[error("invalid value: {0}")]
    Core(#[from] motorwatch_core::CoreError),
}

impl From<reqwest::Error> for TelemetryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            TelemetryError::Feed(e.to_string())
        } else {
            TelemetryError::Http(e.to_string())
        }
    }
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;
