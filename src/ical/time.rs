use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};

/// Which end of an interval a date value is decoded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Start,
    End,
}

/// A decoded `DTSTART`/`DTEND`/`DUE` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateValue {
    pub ts: i64,
    pub all_day: bool,
}

fn utc(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

/// `YYYYMMDD` of the local calendar day containing `ts`.
pub fn format_date(ts: i64) -> String {
    utc(ts).with_timezone(&Local).format("%Y%m%d").to_string()
}

/// `YYYYMMDDTHHMMSS` in local wall-clock time, without a zone suffix.
pub fn format_local(ts: i64) -> String {
    utc(ts)
        .with_timezone(&Local)
        .format("%Y%m%dT%H%M%S")
        .to_string()
}

/// `YYYYMMDDTHHMMSSZ` in UTC.
pub fn format_utc(ts: i64) -> String {
    utc(ts).format("%Y%m%dT%H%M%SZ").to_string()
}

/// Resolve a local wall-clock time to epoch seconds.
///
/// Ambiguous times take the earlier instant. Times inside a DST gap move
/// forward past it, so 02:30 on a spring-forward night becomes 03:30.
pub fn local_to_ts(naive: NaiveDateTime) -> i64 {
    resolve_in(&Local, naive)
}

fn resolve_in<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> i64 {
    if let Some(t) = tz.from_local_datetime(&naive).earliest() {
        return t.timestamp();
    }
    // Gaps are at most an hour in every zone chrono knows
    tz.from_local_datetime(&(naive + TimeDelta::hours(1)))
        .earliest()
        .map(|t| t.timestamp())
        .unwrap_or_else(|| naive.and_utc().timestamp())
}

/// Strip the `T` separator and zone marker, leaving the positional digits.
fn value_digits(raw: &str) -> String {
    raw.trim().chars().filter(|c| *c != 'T' && *c != 'Z').collect()
}

fn parse_ymd(digits: &str) -> Option<NaiveDate> {
    let year = digits.get(0..4)?.parse::<i32>().ok()?;
    let month = digits.get(4..6)?.parse::<u32>().ok()?;
    let day = digits.get(6..8)?.parse::<u32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// A time-of-day group; anything truncated, non-numeric or out of range is 0.
fn time_group(digits: &str, start: usize, max: u32) -> u32 {
    digits
        .get(start..start + 2)
        .and_then(|s| s.parse::<u32>().ok())
        .filter(|v| *v <= max)
        .unwrap_or(0)
}

/// Decode a start/end value positionally.
///
/// Eight digits is a date-only value: local midnight for a start, local
/// 23:59:59 for an end. Fourteen or more digits is a date-time read as local
/// wall-clock time; a trailing `Z` is not treated specially. Returns `None`
/// for any other shape or for a date that does not exist.
pub fn parse_date_value(raw: &str, boundary: Boundary) -> Option<DateValue> {
    let digits = value_digits(raw);

    if digits.len() == 8 {
        let date = parse_ymd(&digits)?;
        let time = match boundary {
            Boundary::Start => NaiveTime::MIN,
            Boundary::End => NaiveTime::from_hms_opt(23, 59, 59)?,
        };
        return Some(DateValue {
            ts: local_to_ts(date.and_time(time)),
            all_day: true,
        });
    }

    if digits.len() >= 14 {
        let date = parse_ymd(&digits)?;
        let time = NaiveTime::from_hms_opt(
            time_group(&digits, 8, 23),
            time_group(&digits, 10, 59),
            time_group(&digits, 12, 59),
        )?;
        return Some(DateValue {
            ts: local_to_ts(date.and_time(time)),
            all_day: false,
        });
    }

    None
}

/// Decode a provenance or `UNTIL` timestamp.
///
/// A trailing `Z` means UTC, otherwise the value is local. Date-only values
/// resolve to midnight.
pub fn parse_timestamp(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let is_utc = raw.ends_with('Z');
    let digits = value_digits(raw);

    let naive = match digits.len() {
        8 => parse_ymd(&digits)?.and_time(NaiveTime::MIN),
        n if n >= 14 => {
            NaiveDateTime::parse_from_str(digits.get(0..14)?, "%Y%m%d%H%M%S").ok()?
        }
        _ => return None,
    };

    if is_utc {
        Some(naive.and_utc().timestamp())
    } else {
        Some(local_to_ts(naive))
    }
}

/// Epoch seconds of a local wall-clock time that exists in the host zone.
#[cfg(test)]
pub(crate) fn local_ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> i64 {
    Local
        .with_ymd_and_hms(y, mo, d, h, mi, s)
        .earliest()
        .unwrap()
        .timestamp()
}
