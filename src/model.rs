use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A point-in-time description of one catalog track, produced fresh on every
/// resolver run. Only its popularity ends up persisted, inside an
/// [`Observation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSnapshot {
    pub id: String,
    pub name: String,
    pub album: String,
    pub release_date: Option<NaiveDate>,
    pub popularity: i32,
    pub duration: Duration,
    pub uri: String,
}

impl TrackSnapshot {
    pub fn formatted_duration(&self) -> String {
        format_duration(self.duration)
    }

    /// The record written to the store when this snapshot is observed on `date`.
    pub fn observe(&self, date: NaiveDate) -> Observation {
        Observation {
            date,
            track: self.name.clone(),
            album: self.album.clone(),
            spi: self.popularity,
            uri: self.uri.clone(),
            release_date: self.release_date,
            duration: self.formatted_duration(),
        }
    }
}

/// A stored popularity record. One logical observation per track per day is
/// meaningful, although the store may hold duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub date: NaiveDate,
    pub track: String,
    pub album: String,
    pub spi: i32,
    pub uri: String,
    pub release_date: Option<NaiveDate>,
    pub duration: String,
}

/// Wire shape of an observation. Field names are the contract with the
/// table store and must not change.
///
/// Decoding never fails on a field value: one of the wrong type is read as
/// absent, so a hand-edited row cannot take down a whole listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationFields {
    #[serde(
        rename = "Date",
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub date: Option<String>,
    #[serde(
        rename = "Track",
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub track: Option<String>,
    #[serde(
        rename = "Album",
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub album: Option<String>,
    #[serde(
        rename = "SPI",
        default,
        deserialize_with = "lenient_integer",
        skip_serializing_if = "Option::is_none"
    )]
    pub spi: Option<i64>,
    #[serde(
        rename = "URI",
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub uri: Option<String>,
    #[serde(
        rename = "Release Date",
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub release_date: Option<String>,
    #[serde(
        rename = "Duration",
        default,
        deserialize_with = "lenient_duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<String>,
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        _ => None,
    })
}

fn lenient_integer<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|v| v.fract() == 0.0).map(|v| v as i64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    })
}

/// Accepts `m:ss` text, or a number of seconds as a duration-typed column
/// returns it.
fn lenient_duration<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        Value::Number(number) => number
            .as_f64()
            .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
            .map(format_duration),
        _ => None,
    })
}

impl From<&Observation> for ObservationFields {
    fn from(observation: &Observation) -> Self {
        Self {
            date: Some(observation.date.format(DATE_FORMAT).to_string()),
            track: Some(observation.track.clone()),
            album: Some(observation.album.clone()),
            spi: Some(observation.spi as i64),
            uri: Some(observation.uri.clone()),
            release_date: observation
                .release_date
                .map(|date| date.format(DATE_FORMAT).to_string()),
            duration: Some(observation.duration.clone()),
        }
    }
}

impl TryFrom<ObservationFields> for Observation {
    type Error = String;

    /// `Date`, `Track` and `SPI` are required; everything else falls back to
    /// an empty value.
    fn try_from(fields: ObservationFields) -> Result<Self, Self::Error> {
        let date = fields.date.ok_or("missing or malformed Date")?;
        let date = parse_date(&date).ok_or_else(|| format!("malformed Date {:?}", date))?;
        let track = fields.track.ok_or("missing or malformed Track")?;
        let spi = fields.spi.ok_or("missing or malformed SPI")?;
        let spi = i32::try_from(spi).map_err(|_| format!("SPI out of range: {}", spi))?;

        Ok(Self {
            date,
            track,
            album: fields.album.unwrap_or_default(),
            spi,
            uri: fields.uri.unwrap_or_default(),
            release_date: fields.release_date.as_deref().and_then(parse_date),
            duration: fields.duration.unwrap_or_default(),
        })
    }
}

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

/// Parses a catalog release date that may only be precise to the year or
/// month ("2019", "2019-03", "2019-03-08"). Missing parts default to the
/// first of the period.
pub fn parse_release_date(value: &str, precision: Option<&str>) -> Option<NaiveDate> {
    let value = value.trim();
    let mut parts = value.split('-');
    let year: i32 = parts.next()?.parse().ok()?;
    // Some catalog entries carry "0000" for an unknown date.
    if year <= 0 {
        return None;
    }
    let month: u32 = match parts.next() {
        Some(month) if precision != Some("year") => month.parse().ok()?,
        _ => 1,
    };
    let day: u32 = match parts.next() {
        Some(day) if precision.map_or(true, |p| p == "day") => day.parse().ok()?,
        _ => 1,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Formats a duration as `minutes:seconds`, truncating sub-second precision.
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
