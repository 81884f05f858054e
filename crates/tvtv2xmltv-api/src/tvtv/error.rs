//! Listings API error types.

/// Errors surfaced by the listings API clients.
///
/// Rate limiting and transient transport failures are retried inside the
/// client; these variants only appear once the retry budget is spent.
#[derive(Debug, thiserror::Error)]
pub enum TvtvError {
    /// Transport-level failure (connect, timeout, body read) after exhausting retries.
    #[error("request to {url} failed after {attempts} attempts: {source}")]
    Transport {
        /// Request URL.
        url: String,
        /// Attempts made, including the first.
        attempts: u32,
        /// Underlying HTTP client error.
        #[source]
        source: reqwest::Error,
    },

    /// Upstream kept answering HTTP 429 until the retry budget ran out.
    #[error("rate limited by upstream at {url} after {attempts} attempts")]
    RateLimited {
        /// Request URL.
        url: String,
        /// Attempts made, including the first.
        attempts: u32,
    },

    /// Non-success HTTP status other than 429 after exhausting retries.
    #[error("unexpected HTTP status {status} from {url}")]
    Status {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Response body did not decode as the expected JSON shape.
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        /// Request URL.
        url: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A request URL could not be constructed from the base URL.
    #[error("invalid request path {path}: {source}")]
    Url {
        /// Offending path fragment.
        path: String,
        /// Underlying parse error.
        #[source]
        source: url::ParseError,
    },

    /// Fixture file could not be read or parsed.
    #[error("fixture {path} is unusable: {message}")]
    Fixture {
        /// Fixture file path.
        path: String,
        /// Read or parse failure description.
        message: String,
    },

    /// Client construction failed.
    #[error("client configuration error: {0}")]
    Builder(String),
}
