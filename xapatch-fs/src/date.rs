//! Timestamps recorded in volume descriptors and directory records.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};

pub type Timestamp = DateTime<FixedOffset>;

/// Expand a year that some mastering tools store as two digits.
fn full_year(year: i32) -> i32 {
    match year {
        0..=59 => year + 2000,
        60..=99 => year + 1900,
        _ => year,
    }
}

/// GMT offset in 15 minute intervals.
fn offset(quarter_hours: u8) -> Option<FixedOffset> {
    FixedOffset::east_opt(i32::from(quarter_hours as i8) * 15 * 60)
}

fn digits(bytes: &[u8]) -> Option<u32> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// Parse the 7-byte binary date of a directory record. Returns `None` for
/// unset or invalid dates.
pub fn parse_record_date(bytes: &[u8]) -> Option<Timestamp> {
    let &[year, month, day, hour, minute, second, tz] = bytes.get(..7)? else {
        return None;
    };
    // The field is defined as years since 1900 but is usually just the last
    // two digits.
    let year = if year < 60 {
        i32::from(year) + 2000
    } else {
        i32::from(year) + 1900
    };
    let naive = NaiveDate::from_ymd_opt(year, month.into(), day.into())?.and_hms_opt(
        hour.into(),
        minute.into(),
        second.into(),
    )?;
    offset(tz)?.from_local_datetime(&naive).single()
}

/// Parse the 17-byte digit-string date of a volume descriptor. Returns `None`
/// for unset or invalid dates.
pub fn parse_volume_date(bytes: &[u8]) -> Option<Timestamp> {
    if bytes.len() < 17 {
        return None;
    }
    let year = full_year(digits(&bytes[0..4])? as i32);
    let naive = NaiveDate::from_ymd_opt(year, digits(&bytes[4..6])?, digits(&bytes[6..8])?)?
        .and_hms_milli_opt(
            digits(&bytes[8..10])?,
            digits(&bytes[10..12])?,
            digits(&bytes[12..14])?,
            digits(&bytes[14..16])? * 10,
        )?;
    offset(bytes[16])?.from_local_datetime(&naive).single()
}

#[cfg(test)]
#[path = "tests/date_tests.rs"]
mod tests;
