//! Motorwatch
//!
//! Root library for the motorwatch binary: a motor telemetry monitor whose
//! HTTP endpoints are protected by named permission policies.
//!
//! # Architecture
//!
//! The binary is a thin orchestrator. Start-up builds one explicit policy
//! registry, installs the guarded endpoints against it and hands both to the
//! axum router through `AppState`. Ingestion runs from the CLI, from a
//! periodic watch loop or from the guarded `POST /ingest` endpoint.

pub mod actor;
pub mod config;
pub mod error;
pub mod http;
pub mod policies;

pub use actor::{HttpContext, User, UserDirectory};
pub use config::{FeedConfig, RootConfig, ServerConfig, StorageConfig, UserConfig};
pub use error::{RootError, RootResult};
pub use http::{build_router, AppState};
pub use policies::{build_registry, Endpoints, Reply};

use motorwatch_telemetry::ReadingStore;
use std::sync::Arc;
use tracing::info;

/// Open the reading store named by the configuration, creating its
/// directory if needed.
pub fn open_store(config: &RootConfig) -> RootResult<Arc<ReadingStore>> {
    let path = &config.storage.database;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    info!(path = %path.display(), "opening reading store");
    Ok(Arc::new(ReadingStore::open(path)?))
}

/// Validate the configuration and build the full application state.
pub fn initialize(config: RootConfig) -> RootResult<AppState> {
    config.validate()?;
    let store = open_store(&config)?;
    AppState::new(config, store)
}
