//! TVTV upstream record types and custom deserializers.

use serde::de::Error;
use serde::{Deserialize, Deserializer};

/// Deserializes a value that upstream sends either as a string or a bare
/// number (channel numbers like `"2.1"` vs `13`).
fn deserialize_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    /// Raw form accepted from upstream.
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        /// Already a string.
        String(String),
        /// Bare JSON number.
        Number(serde_json::Number),
    }

    let result = StringOrNumber::deserialize(deserializer);
    match result.map_err(D::Error::custom)? {
        StringOrNumber::String(s) => Ok(s),
        StringOrNumber::Number(n) => Ok(n.to_string()),
    }
}

/// One tuned station in a channel lineup.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TvtvChannel {
    /// Display channel number (e.g. `"2.1"`); used as the XMLTV channel id.
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub channel_number: String,
    /// Opaque grid query key. Channels without one are excluded from grid
    /// fetches but still appear in the rendered channel list.
    #[serde(default)]
    pub station_id: Option<u64>,
    /// Human-readable station name.
    pub station_call_sign: String,
    /// Relative logo path on the upstream host.
    #[serde(default)]
    pub logo: String,
}

/// One scheduled broadcast entry for a channel on a given day.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TvtvProgram {
    /// Upstream program identifier.
    #[serde(default)]
    pub program_id: Option<String>,
    /// Display title.
    pub title: String,
    /// Episode subtitle. Upstream sends `""` for none; the empty string is
    /// preserved here and dropped at render time.
    #[serde(default)]
    pub subtitle: Option<String>,
    /// Absolute start instant (ISO-8601, UTC).
    pub start_time: String,
    /// Runtime in minutes; drives stop-time arithmetic.
    pub run_time: i64,
    /// Raw upstream duration value, rendered verbatim as an attribute.
    /// Kept separate from `run_time`; the two are never reconciled.
    pub duration: u32,
    /// Single-letter category code (`M`/`N`/`S` are mapped, others are not).
    #[serde(default, rename = "type")]
    pub program_type: Option<String>,
    /// Short tags (`"HD"`, `"New"`, `"Stereo"`, `"EI"`, ...) that drive
    /// additional markup.
    #[serde(default)]
    pub flags: Vec<String>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::indexing_slicing)]

    use super::*;

    #[test]
    fn test_parse_channels_fixture() {
        // Arrange
        let json = include_str!("../../../../fixtures/tvtv/USA-OTA30236_channels.json");

        // Act
        let channels: Vec<TvtvChannel> = serde_json::from_str(json).unwrap();

        // Assert
        assert_eq!(channels.len(), 3);
        assert_eq!(channels[0].channel_number, "2.1");
        assert_eq!(channels[0].station_id, Some(19611));
        assert_eq!(channels[0].station_call_sign, "WCBS");
        assert!(channels[0].logo.starts_with("/gn/i/assets/"));
    }

    #[test]
    fn test_parse_grid_fixture() {
        // Arrange
        let json = include_str!("../../../../fixtures/tvtv/USA-OTA30236_grid.json");

        // Act
        let grid: Vec<Vec<TvtvProgram>> = serde_json::from_str(json).unwrap();

        // Assert
        assert_eq!(grid.len(), 3);
        assert_eq!(grid[0].len(), 2);
        let news = &grid[0][0];
        assert_eq!(news.title, "CBS Evening News");
        assert_eq!(news.run_time, 30);
        assert_eq!(news.duration, 1800);
        assert_eq!(news.program_type.as_deref(), Some("N"));
        assert!(news.flags.iter().any(|f| f == "HD"));
    }

    #[test]
    fn test_parse_channel_with_numeric_number() {
        // Arrange: some lineups carry bare numeric channel numbers
        let json = r#"{"channelNumber": 13, "stationId": 42, "stationCallSign": "WNET", "logo": "/x.png"}"#;

        // Act
        let channel: TvtvChannel = serde_json::from_str(json).unwrap();

        // Assert
        assert_eq!(channel.channel_number, "13");
    }

    #[test]
    fn test_parse_channel_without_station_id() {
        // Arrange
        let json = r#"{"channelNumber": "99.1", "stationCallSign": "AUDIO"}"#;

        // Act
        let channel: TvtvChannel = serde_json::from_str(json).unwrap();

        // Assert
        assert_eq!(channel.station_id, None);
        assert_eq!(channel.logo, "");
    }

    #[test]
    fn test_parse_program_minimal() {
        // Arrange: only the required fields present
        let json = r#"{
            "title": "Test Show",
            "startTime": "2023-05-23T20:00:00.000Z",
            "runTime": 30,
            "duration": 1800
        }"#;

        // Act
        let program: TvtvProgram = serde_json::from_str(json).unwrap();

        // Assert
        assert_eq!(program.subtitle, None);
        assert_eq!(program.program_type, None);
        assert!(program.flags.is_empty());
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        // Arrange
        let json = r#"{
            "channelNumber": "2.1",
            "stationId": 1,
            "stationCallSign": "WCBS",
            "logo": "/l.png",
            "stationName": "WCBS (CBS New York)",
            "webLink": "https://example.invalid"
        }"#;

        // Act
        let result: Result<TvtvChannel, _> = serde_json::from_str(json);

        // Assert
        assert!(result.is_ok());
    }
}
