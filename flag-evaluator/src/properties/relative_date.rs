use chrono::{DateTime, Duration, Months, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static RELATIVE_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?(?P<number>[0-9]+)(?P<interval>[hdwmy])$").expect("valid regex"));

/// Parses filter values like `-7d` or `-1y` into an absolute point in time, relative to now.
pub fn parse_relative_date(value: &str) -> Option<DateTime<Utc>> {
    parse_relative_date_from(value, Utc::now())
}

pub fn parse_relative_date_from(value: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let captures = RELATIVE_DATE_RE.captures(value.trim())?;
    let number: u32 = captures["number"].parse().ok()?;
    // Absurd offsets can't be represented, treat them as unparseable
    if number >= 10_000 {
        return None;
    }

    match &captures["interval"] {
        "h" => now.checked_sub_signed(Duration::hours(i64::from(number))),
        "d" => now.checked_sub_signed(Duration::days(i64::from(number))),
        "w" => now.checked_sub_signed(Duration::weeks(i64::from(number))),
        "m" => now.checked_sub_months(Months::new(number)),
        "y" => now.checked_sub_months(Months::new(number * 12)),
        _ => None,
    }
}
