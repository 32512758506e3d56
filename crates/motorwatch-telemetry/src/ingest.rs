use motorwatch_core::MotorId;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::TelemetryResult;
use crate::feed::Feed;
use crate::store::ReadingStore;

/// HTTP client for the channel feed.
#[derive(Clone)]
pub struct FeedClient {
    http: reqwest::Client,
    url: String,
}

impl FeedClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> TelemetryResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn fetch(&self) -> TelemetryResult<Feed> {
        debug!(url = %self.url, "fetching feed");
        let feed = self
            .http
            .get(&self.url)
            .header("Content-Type", "application/json")
            .send()
            .await?
            .error_for_status()?
            .json::<Feed>()
            .await?;
        Ok(feed)
    }
}

/// Outcome of one ingestion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Entries in the fetched feed.
    pub fetched: usize,
    /// Entries skipped because the store already holds that many rows.
    pub skipped: usize,
    pub added: usize,
}

/// Append the feed entries the store has not seen yet.
///
/// The store's row count is taken as the number of feed entries already
/// ingested, so the first `count()` entries are skipped. Counting and
/// writing happen in one store transaction, so overlapping passes never
/// append the same entry twice. Every new entry is mapped before anything
/// is written; a malformed entry aborts the pass without partial writes.
pub fn apply_feed(
    store: &ReadingStore,
    motor_id: &MotorId,
    feed: &Feed,
) -> TelemetryResult<IngestReport> {
    let (skipped, added) = store.append_unseen(feed.feeds.len(), |skip| {
        feed.feeds[skip..]
            .iter()
            .map(|entry| entry.to_reading(motor_id))
            .collect()
    })?;
    Ok(IngestReport {
        fetched: feed.feeds.len(),
        skipped,
        added,
    })
}

/// Periodic "fetch feed, append new records" job.
pub struct Ingestor {
    client: FeedClient,
    store: Arc<ReadingStore>,
    motor_id: MotorId,
}

impl Ingestor {
    pub fn new(client: FeedClient, store: Arc<ReadingStore>, motor_id: MotorId) -> Self {
        Self {
            client,
            store,
            motor_id,
        }
    }

    pub async fn run_once(&self) -> TelemetryResult<IngestReport> {
        let feed = self.client.fetch().await?;
        let report = apply_feed(&self.store, &self.motor_id, &feed)?;
        info!(
            motor = %self.motor_id,
            fetched = report.fetched,
            added = report.added,
            "ingestion pass complete"
        );
        Ok(report)
    }

    /// Run a pass every `interval` until `shutdown` resolves. Failed passes
    /// are logged and retried on the next tick.
    pub async fn watch<F>(&self, interval: Duration, shutdown: F)
    where
        F: std::future::Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("ingestion watch stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        warn!(error = %e, url = %self.client.url(), "ingestion pass failed");
                    }
                }
            }
        }
    }
}
