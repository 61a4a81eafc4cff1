use anyhow::anyhow;
use chrono::{DateTime, Datelike, Duration, Local, Months, NaiveDate, Utc};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Calendar date of an instant in the host's local timezone.
#[must_use]
pub fn local_date(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&Local).date_naive()
}

/// Millisecond timestamp id for a new record.
///
/// Ids must stay unique and increasing even when two records are created
/// within the same millisecond, so a clock that has not moved past the
/// largest existing id yields `max + 1`.
#[must_use]
pub fn timestamp_id<I>(now: DateTime<Utc>, existing: I) -> i64
where
    I: IntoIterator<Item = i64>,
{
    let now_ms = now.timestamp_millis();
    match existing.into_iter().max() {
        Some(max) if max >= now_ms => max.saturating_add(1),
        _ => now_ms,
    }
}

#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|err| anyhow!("invalid date '{raw}', expected YYYY-MM-DD: {err}"))
}

/// Accepts `today`, `tomorrow`, `yesterday`, or a `YYYY-MM-DD` literal.
pub fn parse_date_expr(raw: &str, today: NaiveDate) -> anyhow::Result<NaiveDate> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "today" => Ok(today),
        "tomorrow" => Ok(add_days(today, 1)),
        "yesterday" => Ok(add_days(today, -1)),
        _ => parse_date(raw),
    }
}

/// Number of days in `month0` (0 = January) of `year`.
///
/// Computed as "day 0 of the next month": the day before its first day.
#[must_use]
pub fn days_in_month(year: i32, month0: u32) -> u32 {
    let (next_year, next_month0) = if month0 >= 11 {
        (year.saturating_add(1), 0)
    } else {
        (year, month0 + 1)
    };
    add_days(first_day_of_month(next_year, next_month0), -1).day()
}

/// Weekday of the first day of `month0`, with 0 = Sunday.
#[must_use]
pub fn first_weekday_of_month(year: i32, month0: u32) -> u32 {
    first_day_of_month(year, month0)
        .weekday()
        .num_days_from_sunday()
}

#[must_use]
pub fn first_day_of_month(year: i32, month0: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month0.min(11) + 1, 1).unwrap_or(NaiveDate::MIN)
}

#[must_use]
pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_add_signed(Duration::days(days))
        .unwrap_or(date)
}

/// Sunday on or before `date`.
#[must_use]
pub fn start_of_week(date: NaiveDate) -> NaiveDate {
    let offset = date.weekday().num_days_from_sunday() as i64;
    add_days(date, -offset)
}

/// Moves `date` by whole months, clamping the day to the target month's length.
#[must_use]
pub fn shift_months(date: NaiveDate, delta: i32) -> NaiveDate {
    let months = Months::new(delta.unsigned_abs());
    let shifted = if delta >= 0 {
        date.checked_add_months(months)
    } else {
        date.checked_sub_months(months)
    };
    shifted.unwrap_or(date)
}

#[must_use]
pub fn month_title(date: NaiveDate) -> String {
    date.format("%B %Y").to_string()
}

#[cfg(test)]
mod tests {
    use chrono::Weekday;

    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn timestamp_id_never_repeats() {
        let now = DateTime::from_timestamp_millis(1_700_000_000_000).expect("valid instant");
        assert_eq!(timestamp_id(now, []), 1_700_000_000_000);
        assert_eq!(timestamp_id(now, [1, 5]), 1_700_000_000_000);
        assert_eq!(
            timestamp_id(now, [1_700_000_000_000]),
            1_700_000_000_001
        );
    }

    #[test]
    fn days_in_month_handles_leap_years_and_december() {
        assert_eq!(days_in_month(2024, 1), 29);
        assert_eq!(days_in_month(2023, 1), 28);
        assert_eq!(days_in_month(1900, 1), 28);
        assert_eq!(days_in_month(2000, 1), 29);
        assert_eq!(days_in_month(2024, 11), 31);
        assert_eq!(days_in_month(2024, 3), 30);
    }

    #[test]
    fn first_weekday_counts_from_sunday() {
        // 2024-02-01 was a Thursday.
        assert_eq!(first_weekday_of_month(2024, 1), 4);
        // 2026-03-01 is a Sunday.
        assert_eq!(first_weekday_of_month(2026, 2), 0);
        // 2025-11-01 is a Saturday.
        assert_eq!(first_weekday_of_month(2025, 10), 6);
    }

    #[test]
    fn format_and_parse_agree() {
        let date = ymd(2024, 2, 9);
        assert_eq!(format_date(date), "2024-02-09");
        assert_eq!(parse_date("2024-02-09").expect("parse"), date);
        assert!(parse_date("02/09/2024").is_err());
    }

    #[test]
    fn date_expressions_resolve_relative_to_today() {
        let today = ymd(2026, 10, 15);
        assert_eq!(parse_date_expr("today", today).expect("today"), today);
        assert_eq!(
            parse_date_expr("Tomorrow", today).expect("tomorrow"),
            ymd(2026, 10, 16)
        );
        assert_eq!(
            parse_date_expr("yesterday", today).expect("yesterday"),
            ymd(2026, 10, 14)
        );
        assert!(parse_date_expr("someday", today).is_err());
    }

    #[test]
    fn week_starts_on_sunday() {
        let start = start_of_week(ymd(2026, 10, 15));
        assert_eq!(start, ymd(2026, 10, 11));
        assert_eq!(start.weekday(), Weekday::Sun);
        assert_eq!(start_of_week(start), start);
    }

    #[test]
    fn shift_months_clamps_day() {
        assert_eq!(shift_months(ymd(2024, 1, 31), 1), ymd(2024, 2, 29));
        assert_eq!(shift_months(ymd(2024, 1, 15), -1), ymd(2023, 12, 15));
        assert_eq!(month_title(ymd(2024, 2, 1)), "February 2024");
    }
}
