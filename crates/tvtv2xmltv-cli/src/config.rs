//! Application configuration loaded from `TVTV_*` environment variables.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Result, bail};
use chrono_tz::Tz;

/// Default lineup when neither `TVTV_LINEUPS` nor `TVTV_LINEUP_ID` is set.
const DEFAULT_LINEUP_ID: &str = "USA-OTA30236";

/// Day-count bounds accepted by the upstream grid endpoint.
const MIN_DAYS: u32 = 1;
/// Upper day-count bound.
const MAX_DAYS: u32 = 8;

/// Application configuration.
///
/// Constructed once at startup and passed into each component; nothing reads
/// the environment after this point.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Target timezone for rendered documents.
    pub timezone: Tz,
    /// Lineups to convert, in configuration order. Never empty.
    pub lineups: Vec<String>,
    /// Days of grid data to fetch, clamped to 1..=8.
    pub days: u32,
    /// Output path for single-lineup conversion.
    pub output_file: PathBuf,
    /// Seconds between background refreshes in server mode (minimum 1).
    pub update_interval: u64,
    /// Bind port for the serving layer; also embedded in source URLs.
    pub port: u16,
    /// Bind host for the serving layer.
    pub host: String,
    /// Substitute the fixture-backed client for the network client.
    pub mock_mode: bool,
    /// Fixture directory for mock mode.
    pub fixtures_dir: PathBuf,
}

/// Parses an integer variable, falling back to the default on absence or
/// garbage (matching the tolerant behavior of the original deployment
/// surface).
fn parse_or_default<T: FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|s| s.parse().ok()).unwrap_or(default)
}

impl AppConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `TVTV_TIMEZONE` does not name a known timezone or
    /// `TVTV_LINEUPS` is set but contains no lineup ids.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    ///
    /// The lookup seam keeps tests away from process-global environment
    /// mutation.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::from_env`].
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let timezone_name =
            lookup("TVTV_TIMEZONE").unwrap_or_else(|| String::from("America/New_York"));
        let timezone: Tz = timezone_name
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid TVTV_TIMEZONE {timezone_name:?}: {e}"))?;

        // TVTV_LINEUPS (comma-separated) wins; TVTV_LINEUP_ID is the legacy
        // single-lineup variable.
        let lineups: Vec<String> = match lookup("TVTV_LINEUPS") {
            Some(raw) => {
                let parsed: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
                if parsed.is_empty() {
                    bail!("TVTV_LINEUPS is set but contains no lineup ids");
                }
                parsed
            }
            None => vec![
                lookup("TVTV_LINEUP_ID").unwrap_or_else(|| String::from(DEFAULT_LINEUP_ID)),
            ],
        };

        let days = parse_or_default(lookup("TVTV_DAYS"), 8u32).clamp(MIN_DAYS, MAX_DAYS);
        let update_interval = parse_or_default(lookup("TVTV_UPDATE_INTERVAL"), 3600u64).max(1);
        let port = parse_or_default(lookup("TVTV_PORT"), 8080u16);

        let mock_mode = lookup("TVTV_MOCK_MODE")
            .is_some_and(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"));

        Ok(Self {
            timezone,
            lineups,
            days,
            output_file: lookup("TVTV_OUTPUT_FILE")
                .map_or_else(|| PathBuf::from("xmltv.xml"), PathBuf::from),
            update_interval,
            port,
            host: lookup("TVTV_HOST").unwrap_or_else(|| String::from("0.0.0.0")),
            mock_mode,
            fixtures_dir: lookup("TVTV_FIXTURES_DIR")
                .map_or_else(|| PathBuf::from("fixtures/tvtv"), PathBuf::from),
        })
    }
}
