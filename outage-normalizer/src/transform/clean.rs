//! Deterministic value cleaning.
//!
//! Nothing here performs I/O. A `Resolved(None)` means the source explicitly
//! said "not available"; `Ambiguous` means the value could not be read and is
//! a candidate for the inference fallback.

use once_cell::sync::Lazy;
use regex::Regex;
use time::{macros::time, Date, Duration, Month, PrimitiveDateTime, Time};

/// Result of a deterministic parse attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<T> {
    Resolved(T),
    Ambiguous,
}

impl<T> Outcome<T> {
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Outcome::Ambiguous)
    }
}

const NOT_AVAILABLE: [&str; 4] = ["na", "n/a", "none", ""];
const APPROX_MARKER: &str = "Approx.";

/// Assumed restoration time when only a date is given.
const END_OF_DAY: Time = time!(23:59:59);

/// Days after the start date a restoration may fall on.
pub const RESTORATION_WINDOW_DAYS: i64 = 183;

static US_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4}|\d{2})$").expect("valid regex"));
static ISO_DATETIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})(?:[T ](\d{1,2}):(\d{2})(?::(\d{2})(?:\.\d+)?)?)?$").expect("valid regex")
});
static CLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\d{1,2}):(\d{2})(?::(\d{2}))?\s*(a\.?\s?m\.?|p\.?\s?m\.?)?$").expect("valid regex")
});
static MONTH_DAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?P<clock>.+?)\s+)?(?P<month>[A-Za-z]+)\.?\s+(?P<day>\d{1,2})(?:st|nd|rd|th)?,?$").expect("valid regex")
});
static DATE_CLOCK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\S+)(?:\s+(.+))?$").expect("valid regex"));

const MONTH_NAMES: [(&str, Month); 12] = [
    ("january", Month::January),
    ("february", Month::February),
    ("march", Month::March),
    ("april", Month::April),
    ("may", Month::May),
    ("june", Month::June),
    ("july", Month::July),
    ("august", Month::August),
    ("september", Month::September),
    ("october", Month::October),
    ("november", Month::November),
    ("december", Month::December),
];

/// Case-insensitive "value not available" check (`NA`, `N/A`, `None`, empty).
pub fn is_not_available(value: &str) -> bool {
    let lowered = value.trim().to_lowercase();
    NOT_AVAILABLE.contains(&lowered.as_str())
}

/// Cleans a numeric cell: strips thousands separators and the approximation
/// marker, keeps the upper bound of a range, then parses.
pub fn clean_number(raw: &str) -> Outcome<Option<u64>> {
    let value = raw.trim().replace(',', "");
    let value = value.trim().replace(APPROX_MARKER, "");
    let value = upper_bound(value.trim()).trim();

    if is_not_available(value) {
        return Outcome::Resolved(None);
    }

    match value.parse::<u64>() {
        Ok(n) => Outcome::Resolved(Some(n)),
        Err(_) => Outcome::Ambiguous,
    }
}

fn upper_bound(value: &str) -> &str {
    value.rsplit('-').next().unwrap_or(value)
}

fn two_digit_year(yy: i32) -> i32 {
    if yy < 69 {
        2000 + yy
    } else {
        1900 + yy
    }
}

fn calendar_date(year: i32, month: u8, day: u8) -> Option<Date> {
    let month = Month::try_from(month).ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

/// `m/d/YY`, `m/d/YYYY` or `YYYY-MM-DD`.
pub fn parse_date(raw: &str) -> Option<Date> {
    let raw = raw.trim();
    if let Some(c) = US_DATE_RE.captures(raw) {
        let year_str = &c[3];
        let year: i32 = year_str.parse().ok()?;
        let year = if year_str.len() == 2 { two_digit_year(year) } else { year };
        return calendar_date(year, c[1].parse().ok()?, c[2].parse().ok()?);
    }
    parse_iso_datetime(raw).map(|dt| dt.date())
}

/// `YYYY-MM-DD`, optionally followed by `THH:MM[:SS[.fff]]` (or a space).
/// A missing time is midnight.
pub fn parse_iso_datetime(raw: &str) -> Option<PrimitiveDateTime> {
    let c = ISO_DATETIME_RE.captures(raw.trim())?;
    let date = calendar_date(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?)?;
    let time = match c.get(4) {
        Some(hour) => {
            let second = match c.get(6) {
                Some(s) => s.as_str().parse().ok()?,
                None => 0,
            };
            Time::from_hms(hour.as_str().parse().ok()?, c[5].parse().ok()?, second).ok()?
        }
        None => Time::MIDNIGHT,
    };
    Some(PrimitiveDateTime::new(date, time))
}

/// Wall-clock time: `HH:MM[:SS]` (24h), `H:MM a.m.`/`p.m.`, `noon`, `midnight`.
pub fn parse_clock_time(raw: &str) -> Option<Time> {
    let raw = raw.trim();
    match raw.to_lowercase().as_str() {
        "noon" => return Time::from_hms(12, 0, 0).ok(),
        "midnight" => return Some(Time::MIDNIGHT),
        _ => {}
    }

    let c = CLOCK_RE.captures(raw)?;
    let mut hour: u8 = c[1].parse().ok()?;
    let minute: u8 = c[2].parse().ok()?;
    let second: u8 = match c.get(3) {
        Some(s) => s.as_str().parse().ok()?,
        None => 0,
    };

    if let Some(meridiem) = c.get(4) {
        if !(1..=12).contains(&hour) {
            return None;
        }
        let pm = meridiem.as_str().to_lowercase().starts_with('p');
        hour = match (pm, hour) {
            (false, 12) => 0,
            (true, 12) => 12,
            (true, h) => h + 12,
            (false, h) => h,
        };
    }

    Time::from_hms(hour, minute, second).ok()
}

fn month_from_name(name: &str) -> Option<Month> {
    let name = name.to_lowercase();
    if name.len() < 3 {
        return None;
    }
    MONTH_NAMES
        .iter()
        .find(|(full, _)| full.starts_with(&name))
        .map(|(_, m)| *m)
}

/// Start of an outage from its reported date and optional clock time.
/// A missing time means midnight.
pub fn parse_start_datetime(date: &str, time: Option<&str>) -> Outcome<PrimitiveDateTime> {
    let Some(date) = parse_date(date) else {
        return Outcome::Ambiguous;
    };

    let time = match time.map(str::trim) {
        None => Time::MIDNIGHT,
        Some(t) if is_not_available(t) => Time::MIDNIGHT,
        Some(t) => match parse_clock_time(t) {
            Some(t) => t,
            None => return Outcome::Ambiguous,
        },
    };

    Outcome::Resolved(PrimitiveDateTime::new(date, time))
}

/// Restoration moment from free text, anchored on the start date.
///
/// Recognizes `"<clock> <Month> <D>"`, `"<Month> <D>"`, `"<date> [<clock>]"`
/// and ISO datetimes. The start year is used unless month/day falls before
/// the start, which rolls into the next year; a date without a clock time is
/// taken as 23:59:59. Results outside the restoration window are ambiguous.
pub fn parse_restoration_datetime(start_date: &str, text: Option<&str>) -> Outcome<Option<PrimitiveDateTime>> {
    let text = match text {
        Some(t) if !is_not_available(t) => t.trim(),
        _ => return Outcome::Resolved(None),
    };
    let Some(start) = parse_date(start_date) else {
        return Outcome::Ambiguous;
    };

    let parsed = parse_explicit_restoration(text).or_else(|| parse_month_day_restoration(start, text));
    match parsed {
        Some(dt) if within_restoration_window(start, dt) => Outcome::Resolved(Some(dt)),
        _ => Outcome::Ambiguous,
    }
}

fn parse_explicit_restoration(text: &str) -> Option<PrimitiveDateTime> {
    if ISO_DATETIME_RE.is_match(text) && text.len() > 10 {
        return parse_iso_datetime(text);
    }
    let c = DATE_CLOCK_RE.captures(text)?;
    let date = parse_date(&c[1])?;
    let time = match c.get(2) {
        Some(clock) => parse_clock_time(clock.as_str())?,
        None => END_OF_DAY,
    };
    Some(PrimitiveDateTime::new(date, time))
}

fn parse_month_day_restoration(start: Date, text: &str) -> Option<PrimitiveDateTime> {
    let c = MONTH_DAY_RE.captures(text)?;
    let month = month_from_name(&c["month"])?;
    let day: u8 = c["day"].parse().ok()?;
    let time = match c.name("clock") {
        Some(clock) => parse_clock_time(clock.as_str())?,
        None => END_OF_DAY,
    };

    let year = if (month as u8, day) < (start.month() as u8, start.day()) {
        start.year() + 1
    } else {
        start.year()
    };
    let date = Date::from_calendar_date(year, month, day).ok()?;
    Some(PrimitiveDateTime::new(date, time))
}

/// Restoration may not precede the start date nor exceed the window after it.
pub fn within_restoration_window(start: Date, restored: PrimitiveDateTime) -> bool {
    let Some(latest) = start.checked_add(Duration::days(RESTORATION_WINDOW_DAYS)) else {
        return false;
    };
    restored.date() >= start && restored.date() <= latest
}

/// Whole minutes from `start` to `restored`, floored. Negative when the
/// restoration precedes the start.
pub fn duration_minutes(start: PrimitiveDateTime, restored: PrimitiveDateTime) -> i64 {
    (restored - start).whole_seconds().div_euclid(60)
}

#[cfg(test)]
mod tests {
    use time::macros::{date, datetime};

    use super::*;

    #[test]
    fn decorated_ranges_resolve_to_upper_bound() {
        assert_eq!(clean_number("Approx. 1,200-1,500"), Outcome::Resolved(Some(1500)));
        assert_eq!(clean_number("1500"), Outcome::Resolved(Some(1500)));
        assert_eq!(clean_number("  250,000 "), Outcome::Resolved(Some(250_000)));
        assert_eq!(clean_number("Approx. 300"), Outcome::Resolved(Some(300)));
        assert_eq!(clean_number("100 - 200"), Outcome::Resolved(Some(200)));
    }

    #[test]
    fn not_available_sentinels_are_null() {
        for raw in ["NA", "n/a", "N/A", "None", "none", "", "   "] {
            assert_eq!(clean_number(raw), Outcome::Resolved(None), "{raw:?}");
        }
    }

    #[test]
    fn unreadable_numbers_are_ambiguous() {
        assert!(clean_number("three thousand").is_ambiguous());
        assert!(clean_number("Unknown").is_ambiguous());
        assert!(clean_number("12.5").is_ambiguous());
        assert!(clean_number("1,000 to 2,000").is_ambiguous());
    }

    #[test]
    fn dates_in_both_source_formats() {
        assert_eq!(parse_date("1/5/02"), Some(date!(2002-01-05)));
        assert_eq!(parse_date("12/31/1999"), Some(date!(1999-12-31)));
        assert_eq!(parse_date("7/4/98"), Some(date!(1998-07-04)));
        assert_eq!(parse_date("2003-08-14"), Some(date!(2003-08-14)));
        assert_eq!(parse_date("2/30/02"), None);
        assert_eq!(parse_date("sometime in May"), None);
    }

    #[test]
    fn clock_times() {
        assert_eq!(parse_clock_time("3:00 p.m."), Some(time!(15:00)));
        assert_eq!(parse_clock_time("12:15 a.m."), Some(time!(00:15)));
        assert_eq!(parse_clock_time("12:30 p.m."), Some(time!(12:30)));
        assert_eq!(parse_clock_time("6:05am"), Some(time!(06:05)));
        assert_eq!(parse_clock_time("16:11:00"), Some(time!(16:11)));
        assert_eq!(parse_clock_time("Noon"), Some(time!(12:00)));
        assert_eq!(parse_clock_time("13:00 p.m."), None);
        assert_eq!(parse_clock_time("evening"), None);
    }

    #[test]
    fn start_defaults_to_midnight_without_time() {
        assert_eq!(
            parse_start_datetime("1/5/02", None),
            Outcome::Resolved(datetime!(2002-01-05 00:00:00))
        );
        assert_eq!(
            parse_start_datetime("1/5/02", Some("n/a")),
            Outcome::Resolved(datetime!(2002-01-05 00:00:00))
        );
        assert_eq!(
            parse_start_datetime("2003-08-14", Some("16:11:00")),
            Outcome::Resolved(datetime!(2003-08-14 16:11:00))
        );
        assert!(parse_start_datetime("1/5/02", Some("late afternoon")).is_ambiguous());
    }

    #[test]
    fn restoration_uses_start_year_and_rolls_over() {
        assert_eq!(
            parse_restoration_datetime("6/1/02", Some("6:00 a.m. June 2")),
            Outcome::Resolved(Some(datetime!(2002-06-02 06:00:00)))
        );
        assert_eq!(
            parse_restoration_datetime("12/30/02", Some("4:30 p.m. Jan. 2")),
            Outcome::Resolved(Some(datetime!(2003-01-02 16:30:00)))
        );
        assert_eq!(
            parse_restoration_datetime("6/1/02", Some("June 3")),
            Outcome::Resolved(Some(datetime!(2002-06-03 23:59:59)))
        );
        assert_eq!(
            parse_restoration_datetime("6/1/02", Some("6/4/02 11:00 p.m.")),
            Outcome::Resolved(Some(datetime!(2002-06-04 23:00:00)))
        );
    }

    #[test]
    fn restoration_sentinels_and_ambiguity() {
        assert_eq!(parse_restoration_datetime("6/1/02", Some("N/A")), Outcome::Resolved(None));
        assert_eq!(parse_restoration_datetime("6/1/02", None), Outcome::Resolved(None));
        assert!(parse_restoration_datetime("6/1/02", Some("Most customers restored by evening")).is_ambiguous());
        // Rolls into March of the next year, well past the window.
        assert!(parse_restoration_datetime("6/1/02", Some("March 1")).is_ambiguous());
    }

    #[test]
    fn duration_is_floored_minutes() {
        let start = datetime!(2002-06-01 10:00:00);
        assert_eq!(duration_minutes(start, datetime!(2002-06-01 11:30:59)), 90);
        assert_eq!(duration_minutes(start, datetime!(2002-06-01 09:59:30)), -1);
        assert_eq!(duration_minutes(start, start), 0);
    }
}
