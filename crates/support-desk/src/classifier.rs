//! Classifier gateway: sends a ticket description to the text-analysis
//! service and returns the cluster plus timing statistics.
//!
//! Stateless. One outbound call per `classify`, no retries.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use escalation::ticket::{ClassificationResult, Cluster};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassificationError {
    /// Rejected locally; no call is made.
    #[error("ticket description is empty")]
    EmptyDescription,

    #[error("classifier request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("classifier returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("classifier response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    /// Decoded, but the values make no sense (negative, non-finite or
    /// implausibly long durations).
    #[error("classifier response is invalid: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, description: &str)
        -> Result<ClassificationResult, ClassificationError>;
}

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    message: &'a str,
}

/// Wire response of the classification endpoint. Durations are in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifyResponse {
    pub cluster_frequency: i64,
    pub cluster_index: i64,
    pub cluster_name: String,
    pub average_duration: f64,
    pub average_reaction: f64,
}

impl ClassifyResponse {
    pub fn into_result(self) -> Result<ClassificationResult, ClassificationError> {
        Ok(ClassificationResult {
            average_duration: seconds("average_duration", self.average_duration)?,
            average_reaction: seconds("average_reaction", self.average_reaction)?,
            cluster: Cluster {
                index: self.cluster_index,
                name: self.cluster_name,
                frequency: self.cluster_frequency,
            },
        })
    }
}

/// Largest accepted cluster statistic, in seconds (one year).
pub const MAX_STATISTIC_SECS: f64 = 365.0 * 24.0 * 3600.0;

fn seconds(field: &str, value: f64) -> Result<Duration, ClassificationError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ClassificationError::InvalidResponse(format!(
            "{field} must be a non-negative number of seconds, got {value}"
        )));
    }
    if value > MAX_STATISTIC_SECS {
        return Err(ClassificationError::InvalidResponse(format!(
            "{field} exceeds {MAX_STATISTIC_SECS} seconds, got {value}"
        )));
    }
    Duration::try_from_secs_f64(value).map_err(|e| {
        ClassificationError::InvalidResponse(format!("{field} out of range ({value}): {e}"))
    })
}

/// HTTP implementation of [`Classifier`].
pub struct HttpClassifier {
    client: reqwest::Client,
    url: String,
}

impl HttpClassifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build classifier HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(
        &self,
        description: &str,
    ) -> Result<ClassificationResult, ClassificationError> {
        if description.trim().is_empty() {
            return Err(ClassificationError::EmptyDescription);
        }

        let resp = self
            .client
            .post(&self.url)
            .json(&ClassifyRequest {
                message: description,
            })
            .send()
            .await?;

        let status = resp.status();
        let body = resp.bytes().await?;
        if !status.is_success() {
            return Err(ClassificationError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let parsed: ClassifyResponse = serde_json::from_slice(&body)?;
        tracing::debug!(
            cluster = %parsed.cluster_name,
            cluster_index = parsed.cluster_index,
            average_reaction = parsed.average_reaction,
            "description classified"
        );
        parsed.into_result()
    }
}
