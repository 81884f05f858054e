//! Listings API client library for tvtv2xmltv.
//!
//! Provides the network-backed client for the TVTV listings API and a
//! fixture-backed stand-in for offline operation.

/// TVTV listings API client.
pub mod tvtv;
