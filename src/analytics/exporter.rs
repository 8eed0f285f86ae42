//! Asynchronous schema usage export.
//!
//! # Data Flow
//! ```text
//! OperationMetrics::finish()
//!     → UsageExporter::record()   (try_send, never waits)
//!     → bounded queue
//!     → ExportWorker              (batch by size or interval)
//!     → POST collector            (retry with backoff jitter)
//! ```
//!
//! # Design Decisions
//! - A full queue drops the record being enqueued and counts it
//! - Delivery errors are logged and never reach the request path
//! - The stop signal closes the queue, drains it and flushes what is left.
//!   Send it once the HTTP server has drained; records finished after that
//!   are dropped as `closed`

use std::time::{Duration, Instant};

use axum::http::StatusCode;
use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use url::Url;

use crate::analytics::schema_usage::SchemaUsageInfo;
use crate::config::GatewayConfig;
use crate::resilience::retries::{is_retryable_error, is_retryable_status, RetryPolicy};

/// Counter of records dropped before delivery.
pub const DROPPED_TOTAL: &str = "router_graphqlmetrics_dropped_total";

/// Collector RPC path, relative to the collector endpoint.
pub const PUBLISH_PATH: &str =
    "/wg.cosmo.graphqlmetrics.v1.GraphQLMetricsService/PublishGraphQLMetrics";

/// Receiver of schema usage records.
///
/// `record` must return immediately.
pub trait UsageSink: Send + Sync {
    fn record(&self, info: SchemaUsageInfo);
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("collector request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("collector responded with {0}")]
    Status(StatusCode),
}

impl ExportError {
    fn is_retryable(&self) -> bool {
        match self {
            ExportError::Request(err) => is_retryable_error(err),
            ExportError::Status(status) => is_retryable_status(*status),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExporterSettings {
    pub publish_url: Url,
    pub api_token: String,
    pub queue_size: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub retry: RetryPolicy,
}

impl ExporterSettings {
    pub fn new(collector_endpoint: &str, api_token: impl Into<String>) -> Result<Self, url::ParseError> {
        let publish_url = Url::parse(&format!(
            "{}{}",
            collector_endpoint.trim_end_matches('/'),
            PUBLISH_PATH
        ))?;
        Ok(Self {
            publish_url,
            api_token: api_token.into(),
            queue_size: 10240,
            batch_size: 1024,
            flush_interval: Duration::from_secs(10),
            retry: RetryPolicy::disabled(),
        })
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self, url::ParseError> {
        let metrics = &config.graphql_metrics;
        let mut settings = Self::new(&metrics.collector_endpoint, config.graph.token.clone())?;
        settings.queue_size = metrics.queue_size.max(1);
        settings.batch_size = metrics.batch_size.max(1);
        settings.flush_interval = metrics.flush_interval;
        settings.retry = RetryPolicy::from(&config.traffic_shaping.all.retry);
        Ok(settings)
    }
}

#[derive(Serialize)]
struct PublishRequest<'a> {
    #[serde(rename = "schemaUsage")]
    schema_usage: &'a [SchemaUsageInfo],
}

/// Request-side handle of the export queue.
#[derive(Debug, Clone)]
pub struct UsageExporter {
    tx: mpsc::Sender<SchemaUsageInfo>,
}

impl UsageExporter {
    /// Create the queue. The returned worker must be spawned for records to
    /// be delivered.
    pub fn new(settings: ExporterSettings) -> (Self, ExportWorker) {
        let (tx, rx) = mpsc::channel(settings.queue_size.max(1));
        (Self { tx }, ExportWorker { rx, settings })
    }
}

impl UsageSink for UsageExporter {
    fn record(&self, info: SchemaUsageInfo) {
        let reason = match self.tx.try_send(info) {
            Ok(()) => return,
            Err(mpsc::error::TrySendError::Full(_)) => "queue_full",
            Err(mpsc::error::TrySendError::Closed(_)) => "closed",
        };
        counter!(DROPPED_TOTAL, "reason" => reason).increment(1);
        tracing::debug!(reason, "Dropping schema usage record");
    }
}

/// Background task delivering queued records to the collector.
#[derive(Debug)]
pub struct ExportWorker {
    rx: mpsc::Receiver<SchemaUsageInfo>,
    settings: ExporterSettings,
}

impl ExportWorker {
    pub async fn run(mut self, client: reqwest::Client, mut shutdown: broadcast::Receiver<()>) {
        let batch_size = self.settings.batch_size.max(1);
        let mut batch: Vec<SchemaUsageInfo> = Vec::with_capacity(batch_size);

        let mut ticker = tokio::time::interval(self.settings.flush_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        tracing::info!(
            url = %self.settings.publish_url,
            batch_size,
            flush_interval = ?self.settings.flush_interval,
            "Schema usage exporter started"
        );

        loop {
            tokio::select! {
                received = self.rx.recv() => match received {
                    Some(info) => {
                        batch.push(info);
                        if batch.len() >= batch_size {
                            self.flush(&client, &mut batch).await;
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => self.flush(&client, &mut batch).await,
                _ = shutdown.recv() => {
                    self.rx.close();
                    while let Some(info) = self.rx.recv().await {
                        batch.push(info);
                        if batch.len() >= batch_size {
                            self.flush(&client, &mut batch).await;
                        }
                    }
                    break;
                }
            }
        }

        self.flush(&client, &mut batch).await;
        tracing::info!("Schema usage exporter stopped");
    }

    async fn flush(&self, client: &reqwest::Client, batch: &mut Vec<SchemaUsageInfo>) {
        if batch.is_empty() {
            return;
        }
        let records = std::mem::take(batch);

        match self.publish(client, &records).await {
            Ok(()) => tracing::debug!(records = records.len(), "Published schema usage"),
            Err(e) => {
                counter!(DROPPED_TOTAL, "reason" => "delivery_failed").increment(records.len() as u64);
                tracing::warn!(error = %e, records = records.len(), "Failed to publish schema usage");
            }
        }
    }

    async fn publish(
        &self,
        client: &reqwest::Client,
        records: &[SchemaUsageInfo],
    ) -> Result<(), ExportError> {
        let body = PublishRequest {
            schema_usage: records,
        };
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let mut request = client.post(self.settings.publish_url.clone()).json(&body);
            if !self.settings.api_token.is_empty() {
                request = request.bearer_auth(&self.settings.api_token);
            }

            let err = match request.send().await {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => ExportError::Status(response.status()),
                Err(e) => ExportError::Request(e),
            };

            if !err.is_retryable() || !self.settings.retry.should_retry(attempt, started.elapsed()) {
                return Err(err);
            }

            let delay = self.settings.retry.backoff(attempt);
            tracing::debug!(attempt, delay = ?delay, error = %err, "Retrying schema usage publish");
            tokio::time::sleep(delay).await;
        }
    }
}
