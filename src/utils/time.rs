//! Time utilities for the provider parsers
//!
//! All helpers are pure functions taking explicit inputs; no ambient
//! locale or timezone defaults are consulted.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Constant zone used for the Venetsia feed.
///
/// Venetsia timestamps carry a wrong offset suffix during DST (+02:00 is
/// printed when Helsinki is at +03:00). The printed offset is discarded and
/// the wall-clock part is always interpreted as Europe/Helsinki local time.
pub const VENETSIA_ZONE: Tz = chrono_tz::Europe::Helsinki;

/// Parse a Venetsia timestamp (`2023-07-01T20:00:00+02:00` or a bare date),
/// discarding any printed offset, as Helsinki local time.
pub fn parse_helsinki_datetime(raw: &str) -> Result<DateTime<Utc>, String> {
    helsinki_naive_to_utc(parse_helsinki_naive(raw)?)
}

/// The wall-clock part of a Venetsia timestamp, offset suffix discarded.
pub fn parse_helsinki_naive(raw: &str) -> Result<NaiveDateTime, String> {
    let clock = raw.trim().split('+').next().unwrap_or_default().trim();

    if let Ok(dt) = NaiveDateTime::parse_from_str(clock, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt);
    }
    if let Ok(date) = NaiveDate::parse_from_str(clock, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| format!("could not parse timestamp '{raw}'"));
    }

    Err(format!("could not parse timestamp '{raw}'"))
}

/// Resolve a Helsinki wall-clock time to UTC. Ambiguous times around the
/// autumn DST fold resolve to the earlier instant.
pub fn helsinki_naive_to_utc(naive: NaiveDateTime) -> Result<DateTime<Utc>, String> {
    VENETSIA_ZONE
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| format!("nonexistent Helsinki local time '{naive}'"))
}

/// Parse provider datetimes that come in one of a few reasonable shapes:
/// RFC 3339, `YYYY-MM-DDTHH:MM:SS`, `YYYY-MM-DD HH:MM:SS` or compact
/// `YYYYMMDDHHMMSS`. Offset-less forms are taken as UTC.
pub fn parse_flexible_datetime(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("empty timestamp".to_string());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y%m%d%H%M%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    Err(format!("could not parse timestamp '{raw}'"))
}

/// Parse the Viacom `YYYYMMDDHHMMSS ±ZZZZ` format and normalize to UTC.
pub fn parse_compact_offset_datetime(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("empty timestamp".to_string());
    }

    DateTime::parse_from_str(raw, "%Y%m%d%H%M%S %z")
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("could not parse timestamp '{raw}': {e}"))
}

/// Parse the Eurosport `dd/mm/yyyy` day attribute.
pub fn parse_day_month_year(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%d/%m/%Y")
        .map_err(|e| format!("could not parse date '{raw}': {e}"))
}

/// Parse an `HH:MM` clock time onto a given UTC day.
pub fn parse_clock_on_day(day: NaiveDate, raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    let (hours, minutes) = raw
        .split_once(':')
        .ok_or_else(|| format!("could not parse time '{raw}'"))?;
    let hours: u32 = hours
        .parse()
        .map_err(|_| format!("could not parse time '{raw}'"))?;
    let minutes: u32 = minutes
        .parse()
        .map_err(|_| format!("could not parse time '{raw}'"))?;

    let naive = day
        .and_hms_opt(hours, minutes, 0)
        .ok_or_else(|| format!("time '{raw}' out of range"))?;
    Ok(Utc.from_utc_datetime(&naive))
}
