//! `TvtvClient` - TVTV listings API client implementation.

use std::time::Duration;

use reqwest::Client;
use tracing::instrument;
use url::Url;

use super::api::{TvtvApi, TvtvResult};
use super::error::TvtvError;
use super::types::{TvtvChannel, TvtvProgram};

/// Base URL for the TVTV website (logo paths are resolved against it).
pub const TVTV_BASE_URL: &str = "https://www.tvtv.us";

/// Default base URL for the listings API.
const DEFAULT_BASE_URL: &str = concat!("https://www.tvtv.us", "/api/v1/");

/// Maximum stations per grid request (upstream request-size limit).
const GRID_BATCH_SIZE: usize = 20;

/// Default attempt budget per request.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default transport retry unit; the wait scales linearly with the attempt number.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Default rate-limit backoff base; doubles per attempt (5s, 10s, 20s).
const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(5);

/// Default pause after every successful request; keeps the call rate under
/// the upstream's implicit limit regardless of caller behavior.
const DEFAULT_REQUEST_DELAY: Duration = Duration::from_millis(750);

/// Default pause between grid batches while more batches remain.
const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(1500);

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// TVTV listings API client.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct TvtvClient {
    /// HTTP client (reqwest, gzip enabled).
    http_client: Client,
    /// Base URL.
    base_url: Url,
    /// Attempt budget per request.
    max_retries: u32,
    /// Transport retry unit.
    retry_delay: Duration,
    /// Rate-limit backoff base.
    rate_limit_backoff: Duration,
    /// Pause after each successful request.
    request_delay: Duration,
    /// Pause between grid batches.
    batch_delay: Duration,
}

/// Builder for `TvtvClient`.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct TvtvClientBuilder {
    base_url: Option<Url>,
    user_agent: Option<String>,
    max_retries: Option<u32>,
    retry_delay: Option<Duration>,
    rate_limit_backoff: Option<Duration>,
    request_delay: Option<Duration>,
    batch_delay: Option<Duration>,
    timeout: Option<Duration>,
}

impl TvtvClientBuilder {
    /// Creates a new builder.
    const fn new() -> Self {
        Self {
            base_url: None,
            user_agent: None,
            max_retries: None,
            retry_delay: None,
            rate_limit_backoff: None,
            request_delay: None,
            batch_delay: None,
            timeout: None,
        }
    }

    /// Overrides the base URL (for wiremock in tests).
    #[must_use]
    pub fn base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Sets the User-Agent (required).
    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Sets the attempt budget per request (default: 3).
    #[must_use]
    pub const fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Sets the transport retry unit (default: 2s).
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Sets the rate-limit backoff base (default: 5s).
    #[must_use]
    pub const fn rate_limit_backoff(mut self, backoff: Duration) -> Self {
        self.rate_limit_backoff = Some(backoff);
        self
    }

    /// Sets the pause after each successful request (default: 750ms).
    #[must_use]
    pub const fn request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = Some(delay);
        self
    }

    /// Sets the pause between grid batches (default: 1.5s).
    #[must_use]
    pub const fn batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = Some(delay);
        self
    }

    /// Sets the per-request timeout (default: 30s).
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// - `user_agent` is not set.
    /// - `reqwest::Client` build fails.
    pub fn build(self) -> TvtvResult<TvtvClient> {
        let user_agent = self
            .user_agent
            .ok_or_else(|| TvtvError::Builder(String::from("user_agent is required")))?;

        let base_url = if let Some(url) = self.base_url {
            url
        } else {
            Url::parse(DEFAULT_BASE_URL).map_err(|source| TvtvError::Url {
                path: String::from(DEFAULT_BASE_URL),
                source,
            })?
        };

        let http_client = Client::builder()
            .user_agent(&user_agent)
            .gzip(true)
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| TvtvError::Builder(format!("failed to build HTTP client: {e}")))?;

        Ok(TvtvClient {
            http_client,
            base_url,
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            retry_delay: self.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY),
            rate_limit_backoff: self.rate_limit_backoff.unwrap_or(DEFAULT_RATE_LIMIT_BACKOFF),
            request_delay: self.request_delay.unwrap_or(DEFAULT_REQUEST_DELAY),
            batch_delay: self.batch_delay.unwrap_or(DEFAULT_BATCH_DELAY),
        })
    }
}

impl TvtvClient {
    /// Creates a new builder.
    #[must_use]
    pub const fn builder() -> TvtvClientBuilder {
        TvtvClientBuilder::new()
    }

    /// Joins a relative path onto the base URL.
    fn api_url(&self, path: &str) -> TvtvResult<Url> {
        self.base_url.join(path).map_err(|source| TvtvError::Url {
            path: String::from(path),
            source,
        })
    }

    /// Sends a GET request with retry logic and rate-limit handling.
    ///
    /// HTTP 429 waits `rate_limit_backoff * 2^(attempt-1)` before retrying;
    /// transport failures, non-success statuses, and undecodable bodies wait
    /// `retry_delay * attempt`. After a successful decode the client pauses
    /// for `request_delay` before returning.
    #[instrument(skip_all)]
    #[allow(clippy::arithmetic_side_effects)]
    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> TvtvResult<T> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            let send_result = self.http_client.get(url.clone()).send().await;
            let response = match send_result {
                Ok(r) => r,
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(TvtvError::Transport {
                            url: url.to_string(),
                            attempts: attempt,
                            source: e,
                        });
                    }
                    tracing::warn!(attempt, error = %e, "Request failed, will retry");
                    tokio::time::sleep(self.retry_delay.saturating_mul(attempt)).await;
                    continue;
                }
            };

            let status = response.status();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                if attempt >= self.max_retries {
                    return Err(TvtvError::RateLimited {
                        url: url.to_string(),
                        attempts: attempt,
                    });
                }
                let backoff = self
                    .rate_limit_backoff
                    .saturating_mul(2u32.saturating_pow(attempt - 1));
                tracing::warn!(
                    attempt,
                    backoff_secs = backoff.as_secs(),
                    "Rate limited (429), waiting before retry"
                );
                tokio::time::sleep(backoff).await;
                continue;
            }

            if !status.is_success() {
                if attempt >= self.max_retries {
                    return Err(TvtvError::Status {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                tracing::warn!(attempt, code = status.as_u16(), "HTTP error, will retry");
                tokio::time::sleep(self.retry_delay.saturating_mul(attempt)).await;
                continue;
            }

            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(TvtvError::Transport {
                            url: url.to_string(),
                            attempts: attempt,
                            source: e,
                        });
                    }
                    tracing::warn!(attempt, error = %e, "Failed to read response body, will retry");
                    tokio::time::sleep(self.retry_delay.saturating_mul(attempt)).await;
                    continue;
                }
            };

            tracing::debug!(body_len = body.len(), "Response body received");

            match serde_json::from_str(&body) {
                Ok(parsed) => {
                    tokio::time::sleep(self.request_delay).await;
                    return Ok(parsed);
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(TvtvError::Decode {
                            url: url.to_string(),
                            source: e,
                        });
                    }
                    tracing::warn!(attempt, error = %e, "Decode error, will retry");
                    tokio::time::sleep(self.retry_delay.saturating_mul(attempt)).await;
                }
            }
        }
    }
}

impl TvtvApi for TvtvClient {
    #[instrument(skip_all)]
    async fn fetch_channels(&self, lineup_id: &str) -> TvtvResult<Vec<TvtvChannel>> {
        let url = self.api_url(&format!("lineup/{lineup_id}/channels"))?;
        let channels: Vec<TvtvChannel> = self.get_json(url).await?;
        tracing::info!(lineup_id, channels = channels.len(), "Channel lineup fetched");
        Ok(channels)
    }

    #[instrument(skip_all)]
    async fn fetch_grid(
        &self,
        lineup_id: &str,
        start_time: &str,
        end_time: &str,
        station_ids: &[u64],
    ) -> TvtvResult<Vec<Vec<TvtvProgram>>> {
        let mut all_listings: Vec<Vec<TvtvProgram>> = Vec::new();

        let batches: Vec<&[u64]> = station_ids.chunks(GRID_BATCH_SIZE).collect();
        let total_batches = batches.len();

        for (i, batch) in batches.into_iter().enumerate() {
            let batch_str = batch
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",");

            let url = self.api_url(&format!(
                "lineup/{lineup_id}/grid/{start_time}/{end_time}/{batch_str}"
            ))?;

            let listings: Vec<Vec<TvtvProgram>> = self.get_json(url).await?;

            tracing::debug!(
                batch = i.saturating_add(1),
                total_batches,
                rows = listings.len(),
                "Grid batch fetched"
            );
            all_listings.extend(listings);

            // Extra pacing on top of the per-request delay while batches remain.
            if i.saturating_add(1) < total_batches {
                tokio::time::sleep(self.batch_delay).await;
            }
        }

        Ok(all_listings)
    }
}
