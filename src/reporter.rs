//! Publishing the debounced state to the backend.
//!
//! The backend treats every report as a full replacement of the camera's
//! previous state, so a failed send needs no retry queue: the next cycle
//! sends a freshly computed snapshot.

use crate::models::{SnapshotEntry, StableSnapshot};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

/// Wire body of one report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub camera_id: String,
    pub detections: Vec<SnapshotEntry>,
}

impl Report {
    pub fn new(camera_id: impl Into<String>, snapshot: &StableSnapshot) -> Self {
        Self {
            camera_id: camera_id.into(),
            detections: snapshot.entries().to_vec(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("backend answered {status}")]
    Status { status: StatusCode },
    #[error("failed to build http client")]
    Client(#[source] reqwest::Error),
    #[error("failed to start reporter runtime")]
    Runtime(#[source] std::io::Error),
    #[error("failed to encode report")]
    Encode(#[source] serde_json::Error),
}

/// Destination for per-cycle reports
pub trait Publisher: Send {
    fn publish(&mut self, report: &Report) -> Result<(), ReportError>;
}

/// Async HTTP client for the detections endpoint
#[derive(Debug, Clone)]
pub struct ReportClient {
    client: reqwest::Client,
    endpoint: Url,
}

impl ReportClient {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, ReportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ReportError::Client)?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// POST one report; any non-2xx answer is an error
    pub async fn send(&self, report: &Report) -> Result<(), ReportError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(report)
            .send()
            .await
            .map_err(|source| ReportError::Transport {
                url: self.endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReportError::Status { status });
        }
        debug!("Backend accepted report ({})", status);
        Ok(())
    }
}

/// Blocking publisher for the worker thread.
///
/// Owns a current-thread runtime; each publish is one synchronous send
/// bounded by the client timeout.
pub struct HttpReporter {
    client: ReportClient,
    runtime: tokio::runtime::Runtime,
}

impl HttpReporter {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, ReportError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ReportError::Runtime)?;
        Ok(Self {
            client: ReportClient::new(endpoint, timeout)?,
            runtime,
        })
    }
}

impl Publisher for HttpReporter {
    fn publish(&mut self, report: &Report) -> Result<(), ReportError> {
        self.runtime.block_on(self.client.send(report))?;
        info!(
            "Sent {} stable detections to {}",
            report.detections.len(),
            self.client.endpoint()
        );
        Ok(())
    }
}

/// Logs reports instead of sending them
#[derive(Debug, Default)]
pub struct LogPublisher;

impl Publisher for LogPublisher {
    fn publish(&mut self, report: &Report) -> Result<(), ReportError> {
        let body = serde_json::to_string(report).map_err(ReportError::Encode)?;
        info!("Report (dry run): {}", body);
        Ok(())
    }
}
