//! `TvtvApi` trait definition.
#![allow(clippy::future_not_send)]

use super::error::TvtvError;
use super::types::{TvtvChannel, TvtvProgram};

/// Result alias for listings API operations.
pub type TvtvResult<T> = Result<T, TvtvError>;

/// TVTV listings API capability.
///
/// Abstracts the two upstream reads so the conversion pipeline can run
/// against the network-backed client, the fixture-backed client, or a test
/// double. Uses `trait_variant::make` to generate a `Send`-bound async trait.
#[trait_variant::make(TvtvApi: Send)]
pub trait LocalTvtvApi {
    /// Fetches the channel lineup.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream is unreachable or keeps answering
    /// non-success statuses after the retry budget is spent.
    async fn fetch_channels(&self, lineup_id: &str) -> TvtvResult<Vec<TvtvChannel>>;

    /// Fetches grid data for the given stations and time window.
    ///
    /// The result is index-aligned with `station_ids`. Requests are split
    /// into batches of at most 20 stations and the per-batch results are
    /// concatenated in batch order, preserving that alignment.
    ///
    /// # Errors
    ///
    /// Returns an error if any batch request fails after retries.
    async fn fetch_grid(
        &self,
        lineup_id: &str,
        start_time: &str,
        end_time: &str,
        station_ids: &[u64],
    ) -> TvtvResult<Vec<Vec<TvtvProgram>>>;
}
