//! Configuration helpers shared by the devprof binaries.
//!
//! Measurement windows are configured as durations. The deserializer here
//! accepts both numeric values (interpreted as milliseconds) and duration
//! strings with units.

use fundu::{DurationParser, TimeUnit};
use serde::Deserializer;
use serde::de::{self, Visitor};
use std::time::Duration;

/// Default log level of "info"
pub fn default_log_level() -> String {
    "info".to_string()
}

/// Integer milliseconds or unit-suffixed terms (`ms`, `s`, `m`), summed
const DURATION_PARSER: DurationParser<'static> = DurationParser::builder()
    .time_units(&[TimeUnit::MilliSecond, TimeUnit::Second, TimeUnit::Minute])
    .parse_multiple(None)
    .allow_time_unit_delimiter()
    .disable_infinity()
    .disable_fraction()
    .disable_exponent()
    .default_unit(TimeUnit::MilliSecond)
    .build();

/// Parse a duration string such as `"250"`, `"2s"` or `"1s 500ms"`
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let parsed = DURATION_PARSER
        .parse(value)
        .map_err(|e| format!("bad duration '{value}': {e} (try '50', '250ms' or '2s')"))?;
    parsed
        .try_into()
        .map_err(|e| format!("duration '{value}' out of range: {e}"))
}

/// Serde adapter for duration fields: bare numbers are milliseconds, strings
/// go through [`parse_duration`]
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(MillisOrString)
}

struct MillisOrString;

impl Visitor<'_> for MillisOrString {
    type Value = Duration;

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("milliseconds or a duration string")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Duration, E> {
        parse_duration(value).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Duration, E> {
        Ok(Duration::from_millis(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Duration, E> {
        u64::try_from(value)
            .map(Duration::from_millis)
            .map_err(|_| E::custom(format!("negative duration {value}ms")))
    }
}
