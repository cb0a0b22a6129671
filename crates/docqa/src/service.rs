//! Retrying JSON-over-HTTP client shared by the model backends.
//!
//! Retry strategy:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and request timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! The whole call, retries included, is bounded by the configured timeout:
//! a backoff that would end past the deadline is skipped and the last error
//! is returned instead. A request that timed out on its final attempt
//! surfaces as [`RagError::ServiceTimeout`].

use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::warn;

use docqa_core::{RagError, Result};

pub struct HttpService {
    service: &'static str,
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
    backoff_base: Duration,
}

impl HttpService {
    /// `service` names the backend in errors and logs (e.g. `"embedding"`).
    pub fn new(service: &'static str, timeout_secs: u64, max_retries: u32) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(timeout_secs);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            service,
            client,
            timeout,
            max_retries,
            backoff_base: Duration::from_secs(1),
        })
    }

    /// Override the first retry delay; later delays double from it.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// POST `body` to `url` and return the parsed JSON response.
    pub async fn post_json(&self, url: &str, bearer: Option<&str>, body: &Value) -> Result<Value> {
        let started = Instant::now();
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(self.backoff_base, attempt);
                if started.elapsed() + delay >= self.timeout {
                    warn!(service = self.service, attempt, "retry budget exhausted");
                    break;
                }
                tokio::time::sleep(delay).await;
            }

            let mut request = self
                .client
                .post(url)
                .header("Content-Type", "application/json")
                .json(body);
            if let Some(token) = bearer {
                request = request.header("Authorization", format!("Bearer {}", token));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json::<Value>().await.map_err(|e| self.error(e));
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = RagError::Service {
                        service: self.service.to_string(),
                        message: format!("HTTP {}: {}", status, body_text),
                    };

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(service = self.service, %status, attempt, "retrying request");
                        last_err = Some(err);
                        continue;
                    }

                    return Err(err);
                }
                Err(e) => {
                    warn!(service = self.service, error = %e, attempt, "request failed");
                    last_err = Some(self.error(e));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| RagError::Service {
            service: self.service.to_string(),
            message: "request failed after retries".to_string(),
        }))
    }

    fn error(&self, e: reqwest::Error) -> RagError {
        if e.is_timeout() {
            RagError::ServiceTimeout {
                service: self.service.to_string(),
                timeout: self.timeout,
            }
        } else {
            RagError::Service {
                service: self.service.to_string(),
                message: format!("{} ({})", e, e.url().map(|u| u.as_str()).unwrap_or("")),
            }
        }
    }
}

/// Delay before retry number `attempt` (1-based).
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * (1u32 << (attempt - 1).min(5))
}

/// Total sleep time of a full retry schedule with the default 1s base.
pub fn retry_schedule(max_retries: u32) -> Duration {
    let base = Duration::from_secs(1);
    let doubling = max_retries.min(6);
    let doubled: Duration = (1..=doubling).map(|attempt| backoff_delay(base, attempt)).sum();
    doubled + backoff_delay(base, 6) * (max_retries - doubling)
}

/// Run `fut` under `timeout`, mapping expiry to [`RagError::ServiceTimeout`].
pub async fn with_timeout<T>(
    service: &str,
    timeout: Duration,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(RagError::ServiceTimeout {
            service: service.to_string(),
            timeout,
        }),
    }
}
