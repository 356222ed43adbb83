// REST client for the state-sink API
//
// `ApiClient` is the seam the dispatch layer talks to; `RestClient` is the
// reqwest-backed implementation with bearer auth and retry handling.

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::transport::{RetryPolicy, TransportConfig};

/// Anything that can deliver a [`Request`] and hand back the raw [`Response`].
#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn send_request(&self, url: &Url, request: &Request) -> Result<Response, Error>;
}

/// HTTP client posting JSON envelopes to a single endpoint URL.
pub struct RestClient {
    http: reqwest::Client,
    retry: RetryPolicy,
    timeout_secs: u64,
}

impl RestClient {
    /// Create a client from a `TransportConfig`.
    pub fn new(transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            retry: transport.retry,
            timeout_secs: transport.timeout.as_secs(),
        })
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, retry: RetryPolicy) -> Self {
        Self {
            http,
            retry,
            timeout_secs: 0,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    async fn post_once(&self, url: &Url, body: &[u8]) -> Result<reqwest::Response, Error> {
        self.http
            .post(url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout {
                        timeout_secs: self.timeout_secs,
                    }
                } else {
                    Error::Transport(e)
                }
            })
    }

    async fn parse(resp: reqwest::Response) -> Result<Response, Error> {
        let status = resp.status();
        let body = resp.text().await.map_err(Error::Transport)?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Unauthorized {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }

        Response::from_body(&body)
    }

    /// Honour a numeric `Retry-After` header, capped at `max_wait`.
    fn retry_after(&self, resp: &reqwest::Response, attempt: u32) -> std::time::Duration {
        resp.headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or_else(
                || self.retry.backoff(attempt),
                |secs| std::time::Duration::from_secs(secs).min(self.retry.max_wait),
            )
    }
}

#[async_trait]
impl ApiClient for RestClient {
    async fn send_request(&self, url: &Url, request: &Request) -> Result<Response, Error> {
        let body = request.to_body()?;
        let mut attempt: u32 = 0;

        loop {
            debug!(kind = %request.kind(), attempt, "POST {}", url);

            match self.post_once(url, &body).await {
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    if attempt >= self.retry.count {
                        return Err(Error::RateLimited {
                            attempts: attempt + 1,
                        });
                    }
                    let delay = self.retry_after(&resp, attempt);
                    warn!(
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "rate limited, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(resp) => return Self::parse(resp).await,
                Err(e) if request.is_retryable() && e.is_transient() && attempt < self.retry.count => {
                    let delay = self.retry.backoff(attempt);
                    warn!(error = %e, attempt, "transport error, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }

            attempt += 1;
        }
    }
}
