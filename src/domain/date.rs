//! Due date parsing
//!
//! All accepted spellings normalize to a `NaiveDate`, rendered as ISO
//! `YYYY-MM-DD`. Relative forms resolve against the caller's `today` so
//! parsing stays pure.

use chrono::{DateTime, Duration, NaiveDate};

use super::validation::ValidationError;

/// Canonical rendering of a due date
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parses a user or remote supplied date
///
/// Accepts `YYYY-MM-DD`, `YYYY/MM/DD`, RFC 3339 date-times (date part),
/// `today`, `tomorrow`, `yesterday` and offsets like `+3d`, `-1d`, `+2w`.
pub fn parse_due(input: &str, today: NaiveDate) -> Result<NaiveDate, ValidationError> {
    let trimmed = input.trim();
    let malformed = || ValidationError::MalformedDate(input.to_string());

    if trimmed.is_empty() {
        return Err(malformed());
    }

    match trimmed.to_ascii_lowercase().as_str() {
        "today" => return Ok(today),
        "tomorrow" => return Ok(today + Duration::days(1)),
        "yesterday" => return Ok(today - Duration::days(1)),
        _ => {}
    }

    if let Some(offset) = parse_offset(trimmed) {
        return today
            .checked_add_signed(offset)
            .ok_or_else(malformed);
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, DATE_FORMAT) {
        return Ok(date);
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y/%m/%d") {
        return Ok(date);
    }

    if let Ok(datetime) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(datetime.date_naive());
    }

    Err(malformed())
}

/// Formats a date in the canonical form
pub fn format_due(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parses `+Nd`, `-Nd`, `+Nw` or `-Nw`
fn parse_offset(s: &str) -> Option<Duration> {
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };

    let unit = rest.chars().last()?;
    let amount: i64 = rest[..rest.len() - unit.len_utf8()].parse().ok()?;

    let days = match unit.to_ascii_lowercase() {
        'd' => amount,
        'w' => amount.checked_mul(7)?,
        _ => return None,
    };

    days.checked_mul(sign).and_then(Duration::try_days)
}
