//! XMLTV document renderer for tvtv2xmltv.
//!
//! Pure transformation from fetched lineup data to the XMLTV text format;
//! no I/O. Instants arrive in UTC and are rendered in the configured
//! timezone. Output uses CRLF line endings and escapes `&`, `<`, `>` in all
//! free-text and attribute values.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use tvtv2xmltv_api::tvtv::{TVTV_BASE_URL, TvtvChannel, TvtvProgram};

/// Renderer errors.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Program start instant could not be parsed as ISO-8601.
    #[error("invalid program start time {value:?}: {source}")]
    InvalidStartTime {
        /// Raw upstream value.
        value: String,
        /// Underlying parse error.
        #[source]
        source: chrono::ParseError,
    },

    /// Program runtime does not yield a representable stop instant.
    #[error("invalid program runtime of {minutes} minutes")]
    InvalidRunTime {
        /// Raw upstream value.
        minutes: i64,
    },
}

/// XMLTV document generator.
///
/// One instance per conversion run; holds only the target timezone.
#[derive(Debug, Clone, Copy)]
pub struct XmltvGenerator {
    /// Target timezone for the header timestamp and all programme instants.
    tz: Tz,
}

impl XmltvGenerator {
    /// Creates a generator rendering into the given timezone.
    #[must_use]
    pub const fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Renders a complete XMLTV document.
    ///
    /// `listings_by_day` holds one entry per fetched day; each day holds one
    /// program list per channel, index-aligned with `channels`. Days with
    /// fewer rows than channels contribute nothing for the trailing
    /// channels.
    ///
    /// # Errors
    ///
    /// Returns an error if any program carries an unparsable start time or
    /// an unrepresentable runtime.
    pub fn generate(
        &self,
        channels: &[TvtvChannel],
        listings_by_day: &[Vec<Vec<TvtvProgram>>],
        source_url: &str,
    ) -> Result<String, RenderError> {
        self.generate_at(Utc::now(), channels, listings_by_day, source_url)
    }

    /// Renders a complete XMLTV document with an explicit "now" for the
    /// header timestamp. `generate` delegates here; tests use this entry
    /// point for byte-stable output.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::generate`].
    pub fn generate_at(
        &self,
        now: DateTime<Utc>,
        channels: &[TvtvChannel],
        listings_by_day: &[Vec<Vec<TvtvProgram>>],
        source_url: &str,
    ) -> Result<String, RenderError> {
        let header_date = now
            .with_timezone(&self.tz)
            .format("%Y-%m-%dT00:00:00.000Z");

        let mut lines: Vec<String> = Vec::new();
        lines.push(String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        lines.push(format!(
            r#"<tv date="{header_date}" source-info-url="{}" source-info-name="tvtv2xmltv">"#,
            escape_xml(source_url),
        ));

        for channel in channels {
            lines.push(Self::channel_element(channel));
        }

        // Day-outer, channel-index-inner, program-innermost ordering.
        for day_listings in listings_by_day {
            for (channel, programs) in channels.iter().zip(day_listings.iter()) {
                for program in programs {
                    lines.push(self.programme_element(program, channel)?);
                }
            }
        }

        lines.push(String::from("</tv>"));
        Ok(lines.join("\r\n"))
    }

    /// Renders one `<channel>` block.
    fn channel_element(channel: &TvtvChannel) -> String {
        let number = escape_xml(&channel.channel_number);
        let call_sign = escape_xml(&channel.station_call_sign);
        let logo = escape_xml(&format!("{TVTV_BASE_URL}{}", channel.logo));

        format!(
            "<channel id=\"{number}\">\
             <display-name>{number}</display-name>\
             <display-name>{call_sign}</display-name>\
             <icon src=\"{logo}\" />\
             </channel>"
        )
    }

    /// Renders one `<programme>` block.
    ///
    /// `start`/`stop` come from `run_time` arithmetic in the target
    /// timezone; the `duration` attribute carries the raw upstream value
    /// untouched.
    fn programme_element(
        &self,
        program: &TvtvProgram,
        channel: &TvtvChannel,
    ) -> Result<String, RenderError> {
        let start_local = DateTime::parse_from_rfc3339(&program.start_time)
            .map_err(|source| RenderError::InvalidStartTime {
                value: program.start_time.clone(),
                source,
            })?
            .with_timezone(&self.tz);

        let stop_local = chrono::Duration::try_minutes(program.run_time)
            .and_then(|d| start_local.checked_add_signed(d))
            .ok_or(RenderError::InvalidRunTime {
                minutes: program.run_time,
            })?;

        let start_str = start_local.format("%Y%m%d%H%M%S %z");
        let stop_str = stop_local.format("%Y%m%d%H%M%S %z");
        let number = escape_xml(&channel.channel_number);

        let mut parts: Vec<String> = Vec::new();
        parts.push(format!(
            r#"<programme start="{start_str}" stop="{stop_str}" duration="{}" channel="{number}">"#,
            program.duration,
        ));
        parts.push(format!(
            r#"<title lang="en">{}</title>"#,
            escape_xml(&program.title),
        ));

        if let Some(subtitle) = program.subtitle.as_deref()
            && !subtitle.is_empty()
        {
            parts.push(format!(
                r#"<sub-title lang="en">{}</sub-title>"#,
                escape_xml(subtitle),
            ));
        }

        match program.program_type.as_deref() {
            Some("M") => parts.push(String::from(r#"<category lang="en">movie</category>"#)),
            Some("N") => parts.push(String::from(r#"<category lang="en">news</category>"#)),
            Some("S") => parts.push(String::from(r#"<category lang="en">sports</category>"#)),
            _ => {}
        }

        // Substring containment over the comma-joined flag list, case-sensitive;
        // this is the upstream convention for flag markers.
        let flags = program.flags.join(",");

        if flags.contains("EI") {
            parts.push(String::from(r#"<category lang="en">kids</category>"#));
        }
        if flags.contains("HD") {
            parts.push(String::from("<video><quality>HDTV</quality></video>"));
        }
        if flags.contains("Stereo") {
            parts.push(String::from("<audio><stereo>stereo</stereo></audio>"));
        }
        if flags.contains("New") {
            parts.push(String::from("<new />"));
        }

        parts.push(String::from("</programme>"));
        Ok(parts.concat())
    }
}

/// Escapes `&`, `<`, and `>` for element text and attribute values.
fn escape_xml(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::indexing_slicing)]

    use chrono::TimeZone;

    use super::*;

    /// Parses the document with quick-xml to assert it is well-formed.
    fn assert_well_formed(xml: &str) {
        let mut reader = quick_xml::Reader::from_str(xml);
        reader.config_mut().check_end_names = true;
        loop {
            match reader.read_event() {
                Ok(quick_xml::events::Event::Eof) => break,
                Ok(_) => {}
                Err(e) => panic!("malformed XML: {e}"),
            }
        }
    }

    fn new_york_generator() -> XmltvGenerator {
        XmltvGenerator::new(chrono_tz::America::New_York)
    }

    fn make_channel(number: &str, station_id: Option<u64>, call_sign: &str) -> TvtvChannel {
        serde_json::from_value(serde_json::json!({
            "channelNumber": number,
            "stationId": station_id,
            "stationCallSign": call_sign,
            "logo": "/gn/i/assets/logo.png"
        }))
        .unwrap()
    }

    fn make_program(title: &str, subtitle: &str, type_code: &str, flags: &[&str]) -> TvtvProgram {
        serde_json::from_value(serde_json::json!({
            "programId": "PR123",
            "title": title,
            "subtitle": subtitle,
            "startTime": "2023-05-23T20:00:00.000Z",
            "duration": 1800,
            "runTime": 30,
            "type": type_code,
            "flags": flags
        }))
        .unwrap()
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 5, 23, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_channel_block() {
        // Arrange
        let generator = new_york_generator();
        let channels = vec![make_channel("2.1", Some(12345), "WABC")];

        // Act
        let result = generator
            .generate_at(fixed_now(), &channels, &[], "http://test.local")
            .unwrap();

        // Assert
        assert!(result.contains(r#"<channel id="2.1">"#));
        assert!(result.contains("<display-name>2.1</display-name>"));
        assert!(result.contains("<display-name>WABC</display-name>"));
        assert!(result.contains("https://www.tvtv.us/gn/i/assets/logo.png"));
    }

    #[test]
    fn test_programme_sports_with_flags() {
        // Arrange
        let generator = new_york_generator();
        let channels = vec![make_channel("2.1", Some(12345), "WABC")];
        let listings = vec![vec![vec![make_program(
            "Test Show",
            "Test Episode",
            "S",
            &["HD", "New"],
        )]]];

        // Act
        let result = generator
            .generate_at(fixed_now(), &channels, &listings, "http://test.local")
            .unwrap();

        // Assert
        assert!(result.contains(r#"channel="2.1""#));
        assert!(result.contains(r#"<title lang="en">Test Show</title>"#));
        assert!(result.contains(r#"<sub-title lang="en">Test Episode</sub-title>"#));
        assert!(result.contains(r#"<category lang="en">sports</category>"#));
        assert!(result.contains("<video><quality>HDTV</quality></video>"));
        assert!(result.contains("<new />"));
        assert!(!result.contains("<audio><stereo>stereo</stereo></audio>"));
    }

    #[test]
    fn test_programme_movie_without_subtitle() {
        // Arrange
        let generator = new_york_generator();
        let channels = vec![make_channel("4.1", Some(12346), "WNBC")];
        let listings = vec![vec![vec![make_program("Test Movie", "", "M", &[])]]];

        // Act
        let result = generator
            .generate_at(fixed_now(), &channels, &listings, "http://test.local")
            .unwrap();

        // Assert
        assert!(result.contains(r#"<category lang="en">movie</category>"#));
        assert!(!result.contains("<sub-title"));
    }

    #[test]
    fn test_unmapped_type_emits_no_category() {
        // Arrange
        let generator = new_york_generator();
        let channels = vec![make_channel("2.1", Some(1), "WCBS")];
        let listings = vec![vec![vec![make_program("Quiz Hour", "", "G", &[])]]];

        // Act
        let result = generator
            .generate_at(fixed_now(), &channels, &listings, "http://test.local")
            .unwrap();

        // Assert
        assert!(!result.contains("<category"));
    }

    #[test]
    fn test_ei_flag_maps_to_kids_category() {
        // Arrange
        let generator = new_york_generator();
        let channels = vec![make_channel("2.1", Some(1), "WCBS")];
        let listings = vec![vec![vec![make_program("Wild Kingdom", "", "K", &["EI", "Stereo"])]]];

        // Act
        let result = generator
            .generate_at(fixed_now(), &channels, &listings, "http://test.local")
            .unwrap();

        // Assert
        assert!(result.contains(r#"<category lang="en">kids</category>"#));
        assert!(result.contains("<audio><stereo>stereo</stereo></audio>"));
    }

    #[test]
    fn test_timezone_conversion_and_stop_arithmetic() {
        // Arrange: 20:00 UTC on 2023-05-23 is 16:00 EDT (-0400)
        let generator = new_york_generator();
        let channels = vec![make_channel("2.1", Some(1), "WCBS")];
        let listings = vec![vec![vec![make_program("Test Show", "", "N", &[])]]];

        // Act
        let result = generator
            .generate_at(fixed_now(), &channels, &listings, "http://test.local")
            .unwrap();

        // Assert: stop = start + 30 minutes in local time
        assert!(result.contains(r#"start="20230523160000 -0400""#));
        assert!(result.contains(r#"stop="20230523163000 -0400""#));
        assert!(result.contains(r#"duration="1800""#));
    }

    #[test]
    fn test_escaping_of_special_characters() {
        // Arrange
        let generator = new_york_generator();
        let channels = vec![make_channel("2.1", Some(1), "Test & Station")];
        let listings = vec![vec![vec![make_program("Show <& Movie>", "", "M", &[])]]];

        // Act
        let result = generator
            .generate_at(
                fixed_now(),
                &channels,
                &listings,
                "http://test.local/?a=1&b=2",
            )
            .unwrap();

        // Assert
        assert!(result.contains("Test &amp; Station"));
        assert!(result.contains("Show &lt;&amp; Movie&gt;"));
        assert!(result.contains(r#"source-info-url="http://test.local/?a=1&amp;b=2""#));
        assert_well_formed(&result);
    }

    #[test]
    fn test_header_and_line_endings() {
        // Arrange
        let generator = new_york_generator();
        let channels = vec![make_channel("2.1", Some(1), "WCBS")];

        // Act
        let result = generator
            .generate_at(fixed_now(), &channels, &[], "http://test.local")
            .unwrap();

        // Assert
        assert!(result.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        // Header date carries the local date with a fixed midnight suffix.
        assert!(result.contains(r#"<tv date="2023-05-23T00:00:00.000Z""#));
        assert!(result.contains(r#"source-info-name="tvtv2xmltv""#));
        assert!(result.contains("\r\n"));
        assert!(result.ends_with("</tv>"));
    }

    #[test]
    fn test_missing_trailing_channel_rows_are_skipped() {
        // Arrange: two channels, but the day only carries one listing row
        let generator = new_york_generator();
        let channels = vec![
            make_channel("2.1", Some(1), "WCBS"),
            make_channel("4.1", Some(2), "WNBC"),
        ];
        let listings = vec![vec![vec![make_program("Only Show", "", "N", &[])]]];

        // Act
        let result = generator
            .generate_at(fixed_now(), &channels, &listings, "http://test.local")
            .unwrap();

        // Assert: one programme, bound to the first channel
        assert_eq!(result.matches("<programme").count(), 1);
        assert!(result.contains(r#"channel="2.1""#));
        assert_well_formed(&result);
    }

    #[test]
    fn test_day_outer_channel_inner_ordering() {
        // Arrange: two days x two channels
        let generator = new_york_generator();
        let channels = vec![
            make_channel("2.1", Some(1), "WCBS"),
            make_channel("4.1", Some(2), "WNBC"),
        ];
        let listings = vec![
            vec![
                vec![make_program("D0 C0", "", "N", &[])],
                vec![make_program("D0 C1", "", "N", &[])],
            ],
            vec![
                vec![make_program("D1 C0", "", "N", &[])],
                vec![make_program("D1 C1", "", "N", &[])],
            ],
        ];

        // Act
        let result = generator
            .generate_at(fixed_now(), &channels, &listings, "http://test.local")
            .unwrap();

        // Assert
        let positions: Vec<usize> = ["D0 C0", "D0 C1", "D1 C0", "D1 C1"]
            .iter()
            .map(|t| result.find(t).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_generate_at_is_deterministic() {
        // Arrange
        let generator = new_york_generator();
        let channels = vec![make_channel("2.1", Some(1), "WCBS")];
        let listings = vec![vec![vec![make_program("Test Show", "Ep", "S", &["HD"])]]];

        // Act
        let first = generator
            .generate_at(fixed_now(), &channels, &listings, "http://test.local")
            .unwrap();
        let second = generator
            .generate_at(fixed_now(), &channels, &listings, "http://test.local")
            .unwrap();

        // Assert
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_start_time_is_an_error() {
        // Arrange
        let generator = new_york_generator();
        let channels = vec![make_channel("2.1", Some(1), "WCBS")];
        let mut program = make_program("Broken", "", "N", &[]);
        program.start_time = String::from("yesterday-ish");
        let listings = vec![vec![vec![program]]];

        // Act
        let result = generator.generate_at(fixed_now(), &channels, &listings, "http://test.local");

        // Assert
        assert!(matches!(
            result,
            Err(RenderError::InvalidStartTime { .. })
        ));
    }

    #[test]
    fn test_end_to_end_document_is_well_formed() {
        // Arrange: the full fixture lineup and one day of listings
        let channels: Vec<TvtvChannel> = serde_json::from_str(include_str!(
            "../../../fixtures/tvtv/USA-OTA30236_channels.json"
        ))
        .unwrap();
        let day: Vec<Vec<TvtvProgram>> = serde_json::from_str(include_str!(
            "../../../fixtures/tvtv/USA-OTA30236_grid.json"
        ))
        .unwrap();
        let generator = new_york_generator();

        // Act
        let result = generator
            .generate_at(
                fixed_now(),
                &channels,
                &[day],
                "http://localhost:8080/USA-OTA30236.xml",
            )
            .unwrap();

        // Assert
        assert_well_formed(&result);
        assert_eq!(result.matches("<channel ").count(), 3);
        assert_eq!(result.matches("<programme ").count(), 4);
    }
}
