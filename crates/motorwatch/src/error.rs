use thiserror::Error;

/// Error type for the motorwatch binary, aggregating the library crates.
#[derive(Debug, Error)]
pub enum RootError {
    #[error("permission error: {0}")]
    Perms(#[from] motorwatch_perms::PermsError),

    #[error("telemetry error: {0}")]
    Telemetry(#[from] motorwatch_telemetry::TelemetryError),

    #[error("invalid value: {0}")]
    Core(#[from] motorwatch_core::CoreError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for RootError {
    fn from(e: toml::de::Error) -> Self {
        RootError::Config(format!("TOML parse error: {}", e))
    }
}

pub type RootResult<T> = Result<T, RootError>;
