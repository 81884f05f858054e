//! TVTV listings API client module.
//!
//! Handles HTTP requests against the TVTV `api/v1` endpoints and retrieves
//! channel-lineup and program-grid data.

mod api;
mod client;
mod error;
mod fixture;
mod types;

#[allow(clippy::module_name_repetitions)]
pub use api::{LocalTvtvApi, TvtvApi, TvtvResult};
#[allow(clippy::module_name_repetitions)]
pub use client::{TVTV_BASE_URL, TvtvClient, TvtvClientBuilder};
#[allow(clippy::module_name_repetitions)]
pub use error::TvtvError;
pub use fixture::FixtureClient;
#[allow(clippy::module_name_repetitions)]
pub use types::{TvtvChannel, TvtvProgram};
