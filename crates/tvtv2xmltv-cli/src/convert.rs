//! Conversion pipeline: fetch lineup data, render XMLTV, persist files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Days, Utc};
use tracing::instrument;

use tvtv2xmltv_api::tvtv::{TvtvApi, TvtvChannel, TvtvError};
use tvtv2xmltv_xmltv::{RenderError, XmltvGenerator};

use crate::config::AppConfig;

/// Pause inserted before each lineup after the first, so the upstream sees a
/// bounded aggregate call rate across lineups.
const LINEUP_DELAY: Duration = Duration::from_secs(3);

/// Errors aborting a conversion run.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// Upstream returned an empty channel lineup. Not retried: empty data
    /// will stay empty for this run.
    #[error("no channels returned for lineup {0}")]
    EmptyLineup(String),

    /// No channel carries a usable station id, so grid queries are
    /// impossible. Not retried for the same reason.
    #[error("no usable station ids in lineup {0}")]
    NoStationIds(String),

    /// Listings API failure after the client's retry budget was spent.
    #[error(transparent)]
    Upstream(#[from] TvtvError),

    /// Document rendering failure.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Output file could not be written.
    #[error("failed to write {path}: {source}")]
    Write {
        /// Target path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Drives lineups through fetch and render, and persists the results.
#[derive(Debug)]
pub struct Converter {
    /// Application configuration.
    config: AppConfig,
    /// Document renderer for the configured timezone.
    generator: XmltvGenerator,
}

impl Converter {
    /// Creates a converter for the given configuration.
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        let generator = XmltvGenerator::new(config.timezone);
        Self { config, generator }
    }

    /// Returns the station ids usable for grid queries, in channel order.
    fn valid_station_ids(channels: &[TvtvChannel]) -> Vec<u64> {
        channels.iter().filter_map(|ch| ch.station_id).collect()
    }

    /// Computes the grid window boundary strings for day `day`.
    ///
    /// Day *d* runs from `{now + d days}T04:00:00.000Z` to
    /// `{now + d + 1 days}T03:59:00.000Z`. The asymmetric 04:00 UTC cutover
    /// is an upstream contract.
    fn day_window(now: DateTime<Utc>, day: u32) -> Option<(String, String)> {
        let start = now.checked_add_days(Days::new(u64::from(day)))?;
        let end = now.checked_add_days(Days::new(u64::from(day).checked_add(1)?))?;
        Some((
            start.format("%Y-%m-%dT04:00:00.000Z").to_string(),
            end.format("%Y-%m-%dT03:59:00.000Z").to_string(),
        ))
    }

    /// Converts a single lineup to an XMLTV document.
    ///
    /// Channels without a station id stay in the rendered channel list but
    /// are excluded from grid queries. Days whose grid fetch yields nothing
    /// are skipped silently.
    ///
    /// # Errors
    ///
    /// Returns an error if the lineup is empty, no channel has a station id,
    /// an upstream fetch exhausts its retries, or rendering fails.
    #[instrument(skip_all)]
    pub async fn convert_lineup(
        &self,
        api: &(impl TvtvApi + Sync),
        lineup_id: &str,
    ) -> Result<String, ConvertError> {
        let channels = api.fetch_channels(lineup_id).await?;
        if channels.is_empty() {
            return Err(ConvertError::EmptyLineup(String::from(lineup_id)));
        }

        let station_ids = Self::valid_station_ids(&channels);
        let skipped = channels.len().saturating_sub(station_ids.len());
        if skipped > 0 {
            tracing::warn!(
                lineup_id,
                skipped,
                "Channels without station ids are excluded from grid queries"
            );
        }
        if station_ids.is_empty() {
            return Err(ConvertError::NoStationIds(String::from(lineup_id)));
        }

        let mut listings_by_day = Vec::new();
        for day in 0..self.config.days {
            let Some((start_time, end_time)) = Self::day_window(Utc::now(), day) else {
                break;
            };

            tracing::debug!(lineup_id, day, %start_time, %end_time, "Fetching grid data");
            let day_listings = api
                .fetch_grid(lineup_id, &start_time, &end_time, &station_ids)
                .await?;

            if day_listings.is_empty() {
                tracing::warn!(lineup_id, day, "No grid data for day, skipping");
            } else {
                listings_by_day.push(day_listings);
            }
        }

        let source_url = format!("http://localhost:{}/{lineup_id}.xml", self.config.port);
        Ok(self
            .generator
            .generate(&channels, &listings_by_day, &source_url)?)
    }

    /// Converts every configured lineup, strictly sequentially.
    ///
    /// Returns `(lineup_id, document)` pairs in configuration order. The
    /// first failing lineup aborts the whole run.
    ///
    /// # Errors
    ///
    /// Propagates the first per-lineup failure.
    pub async fn convert(
        &self,
        api: &(impl TvtvApi + Sync),
    ) -> Result<Vec<(String, String)>, ConvertError> {
        let mut results = Vec::with_capacity(self.config.lineups.len());

        for (i, lineup_id) in self.config.lineups.iter().enumerate() {
            if i > 0 {
                tracing::info!(
                    delay_secs = LINEUP_DELAY.as_secs(),
                    "Pausing before next lineup"
                );
                tokio::time::sleep(LINEUP_DELAY).await;
            }

            let document = self.convert_lineup(api, lineup_id).await?;
            results.push((lineup_id.clone(), document));
        }

        Ok(results)
    }

    /// Converts and writes the documents.
    ///
    /// A single configured lineup goes to `filename` (or the configured
    /// output path); multiple lineups each go to `{lineup_id}.xml` next to
    /// the configured output path. Returns the absolute paths in
    /// configuration order.
    ///
    /// # Errors
    ///
    /// Propagates conversion failures and file write failures.
    pub async fn save_to_file(
        &self,
        api: &(impl TvtvApi + Sync),
        filename: Option<&Path>,
    ) -> Result<Vec<PathBuf>, ConvertError> {
        let documents = self.convert(api).await?;
        let single = documents.len() == 1;

        let mut saved = Vec::with_capacity(documents.len());
        for (lineup_id, document) in documents {
            let path = if single {
                filename.map_or_else(|| self.config.output_file.clone(), Path::to_path_buf)
            } else {
                self.config
                    .output_file
                    .parent()
                    .unwrap_or_else(|| Path::new(""))
                    .join(format!("{lineup_id}.xml"))
            };

            let abs = std::path::absolute(&path).map_err(|source| ConvertError::Write {
                path: path.clone(),
                source,
            })?;
            std::fs::write(&abs, &document).map_err(|source| ConvertError::Write {
                path: abs.clone(),
                source,
            })?;

            tracing::info!(lineup_id, path = %abs.display(), "XMLTV document written");
            saved.push(abs);
        }

        Ok(saved)
    }
}
