//! HTTP client for a running policy validation agent
//!
//! Used by the replay command to push facts into a live server. Retries
//! transient failures with exponential backoff; 4xx responses are not
//! retried since resubmitting a malformed fact cannot succeed.

use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PolicyError, Result};
use crate::handler::{ApiResponse, FactRequest, FactResponse};

/// Configuration for the agent client
#[derive(Debug, Clone)]
pub struct AgentClientConfig {
    /// Base URL of the running agent
    pub base_url: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    /// Maximum retry attempts for transient failures
    pub max_retries: u32,
    /// Initial backoff delay in milliseconds
    pub initial_backoff_ms: u64,
}

impl Default for AgentClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:7000".to_string(),
            timeout_ms: 5000,
            max_retries: 3,
            initial_backoff_ms: 100,
        }
    }
}

/// HTTP client for fact submission
pub struct AgentClient {
    client: Client,
    config: AgentClientConfig,
}

impl AgentClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_config(AgentClientConfig {
            base_url: base_url.into(),
            ..Default::default()
        })
    }

    pub fn with_config(config: AgentClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| PolicyError::HttpError(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Submit one fact, retrying transient failures.
    pub async fn post_fact(&self, fact: &FactRequest) -> Result<FactResponse> {
        let url = format!("{}/facts", self.config.base_url.trim_end_matches('/'));
        let mut backoff = self.config.initial_backoff_ms;
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                sleep(Duration::from_millis(backoff)).await;
                backoff = backoff.saturating_mul(2);
            }

            match self.client.post(&url).json(fact).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let body: ApiResponse<FactResponse> = response.json().await?;
                        return body.data.ok_or_else(|| {
                            PolicyError::HttpError("response envelope missing data".to_string())
                        });
                    }
                    if status.is_client_error() {
                        // Not retryable: the fact itself was rejected
                        let detail = response.text().await.unwrap_or_default();
                        return Err(PolicyError::HttpError(format!(
                            "fact rejected with {}: {}",
                            status, detail
                        )));
                    }
                    last_error = Some(PolicyError::HttpError(format!(
                        "server returned {}",
                        status
                    )));
                }
                Err(err) => {
                    tracing::debug!(attempt, error = %err, "Fact submission attempt failed");
                    last_error = Some(err.into());
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| PolicyError::HttpError("fact submission failed".to_string())))
    }

    /// Probe the agent's health endpoint.
    pub async fn health(&self) -> Result<StatusCode> {
        let url = format!("{}/health", self.config.base_url.trim_end_matches('/'));
        let response = self.client.get(&url).send().await?;
        Ok(response.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AgentClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:7000");
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_client_construction() {
        assert!(AgentClient::new("http://localhost:7000").is_ok());
    }
}
