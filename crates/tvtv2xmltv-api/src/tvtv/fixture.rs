//! Fixture-backed stand-in for the network client.

use std::path::PathBuf;

use super::api::{TvtvApi, TvtvResult};
use super::error::TvtvError;
use super::types::{TvtvChannel, TvtvProgram};

/// Client that answers from on-disk JSON fixtures instead of the network.
///
/// File layout: `{dir}/{lineup_id}_channels.json` and
/// `{dir}/{lineup_id}_grid.json`. A missing file logs a warning and yields
/// empty data, so a lineup without fixtures degrades to an empty document
/// rather than an error.
#[derive(Debug, Clone)]
pub struct FixtureClient {
    /// Directory holding the fixture files.
    fixtures_dir: PathBuf,
}

impl FixtureClient {
    /// Creates a fixture client rooted at the given directory.
    #[must_use]
    pub fn new(fixtures_dir: impl Into<PathBuf>) -> Self {
        Self {
            fixtures_dir: fixtures_dir.into(),
        }
    }

    /// Loads and parses one fixture file.
    fn load<T>(&self, filename: &str) -> TvtvResult<T>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        let path = self.fixtures_dir.join(filename);
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Fixture not found, returning empty data");
            return Ok(T::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| TvtvError::Fixture {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| TvtvError::Fixture {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

impl TvtvApi for FixtureClient {
    async fn fetch_channels(&self, lineup_id: &str) -> TvtvResult<Vec<TvtvChannel>> {
        tracing::info!(lineup_id, "Fixture mode: loading channel lineup");
        self.load(&format!("{lineup_id}_channels.json"))
    }

    async fn fetch_grid(
        &self,
        lineup_id: &str,
        _start_time: &str,
        _end_time: &str,
        station_ids: &[u64],
    ) -> TvtvResult<Vec<Vec<TvtvProgram>>> {
        tracing::info!(
            lineup_id,
            stations = station_ids.len(),
            "Fixture mode: loading grid data"
        );
        self.load(&format!("{lineup_id}_grid.json"))
    }
}
