use chrono::{
    DateTime, Datelike, Days, Duration, Months, NaiveDate, NaiveTime, Timelike, Utc, Weekday,
};
use chrono_tz::Tz;
use thiserror::Error;

use crate::timezone::resolve_local_datetime;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeParseError {
    #[error("could not interpret '{0}' as a date or time")]
    Unparseable(String),
    #[error("resolved time is not in the future")]
    PastTime,
}

/// How the calendar date was derived, which decides how an
/// already-elapsed resolution may be pushed forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateSpec {
    None,
    Today,
    Tomorrow,
    Weekday(Weekday),
    MonthDay { month: u32, day: u32 },
    Absolute(NaiveDate),
}

/// Resolves a natural-language time phrase evaluated in `tz` into a UTC
/// instant strictly after `now`. Ambiguous phrases ("friday", "9am")
/// are biased to their nearest future occurrence.
pub fn resolve_future_instant(
    phrase: &str,
    tz: Tz,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, TimeParseError> {
    let normalized = phrase.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return Err(TimeParseError::Unparseable(phrase.trim().to_string()));
    }

    let local_now = now.with_timezone(&tz);

    if let Some(rest) = normalized.strip_prefix("in ") {
        let offset = parse_offset(rest)
            .ok_or_else(|| TimeParseError::Unparseable(phrase.trim().to_string()))?;
        let resolved = now
            .checked_add_signed(offset)
            .ok_or_else(|| TimeParseError::Unparseable(phrase.trim().to_string()))?;
        return if resolved > now {
            Ok(resolved)
        } else {
            Err(TimeParseError::PastTime)
        };
    }

    let tokens = merge_meridiem_tokens(&normalized);
    let mut date_spec = DateSpec::None;
    let mut time_spec: Option<NaiveTime> = None;
    let mut default_time: Option<NaiveTime> = None;
    let mut keep_wall_clock = false;
    let mut explicitly_past = false;
    let mut recognized = 0usize;

    let mut index = 0;
    while index < tokens.len() {
        let token = tokens[index].as_str();
        match token {
            "at" => {
                // "at 9" with no meridiem reads as nine o'clock.
                if let Some(hour) = tokens
                    .get(index + 1)
                    .filter(|next| next.chars().all(|c| c.is_ascii_digit()))
                    .and_then(|next| next.parse::<u32>().ok())
                    .filter(|hour| *hour <= 23)
                {
                    time_spec = Some(
                        NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or_default(),
                    );
                    recognized += 1;
                    index += 1;
                }
            }
            "on" | "the" | "of" | "this" | "next" => {}
            "today" => {
                date_spec = DateSpec::Today;
                keep_wall_clock = true;
                recognized += 1;
            }
            "tonight" => {
                date_spec = DateSpec::Today;
                default_time = Some(NaiveTime::from_hms_opt(20, 0, 0).unwrap());
                recognized += 1;
            }
            "tomorrow" => {
                date_spec = DateSpec::Tomorrow;
                keep_wall_clock = true;
                recognized += 1;
            }
            "yesterday" => {
                explicitly_past = true;
                recognized += 1;
            }
            "morning" => {
                default_time = Some(NaiveTime::from_hms_opt(9, 0, 0).unwrap());
                recognized += 1;
            }
            "afternoon" => {
                default_time = Some(NaiveTime::from_hms_opt(15, 0, 0).unwrap());
                recognized += 1;
            }
            "evening" => {
                default_time = Some(NaiveTime::from_hms_opt(18, 0, 0).unwrap());
                recognized += 1;
            }
            "week" => {
                date_spec = DateSpec::Absolute(
                    local_now
                        .date_naive()
                        .checked_add_days(Days::new(7))
                        .ok_or(TimeParseError::PastTime)?,
                );
                keep_wall_clock = true;
                recognized += 1;
            }
            "month" => {
                date_spec = DateSpec::Absolute(
                    local_now
                        .date_naive()
                        .checked_add_months(Months::new(1))
                        .ok_or(TimeParseError::PastTime)?,
                );
                keep_wall_clock = true;
                recognized += 1;
            }
            _ => {
                if let Some(weekday) = parse_weekday(token) {
                    date_spec = DateSpec::Weekday(weekday);
                    recognized += 1;
                } else if let Some(time) = parse_time_token(token) {
                    time_spec = Some(time);
                    recognized += 1;
                } else if let Some(date) = parse_iso_date(token) {
                    date_spec = DateSpec::Absolute(date);
                    recognized += 1;
                } else if let Some(month) = parse_month(token) {
                    let day = tokens
                        .get(index + 1)
                        .and_then(|next| parse_day_of_month(next));
                    if let Some(day) = day {
                        date_spec = DateSpec::MonthDay { month, day };
                        recognized += 1;
                        index += 1;
                    }
                } else if let Some(day) = parse_day_of_month(token) {
                    // "2nd of june" ordering
                    if let Some(month) = tokens.get(index + 1).and_then(|next| {
                        if next == "of" {
                            tokens.get(index + 2).and_then(|after| parse_month(after))
                        } else {
                            parse_month(next)
                        }
                    }) {
                        date_spec = DateSpec::MonthDay { month, day };
                        recognized += 1;
                        index += if tokens.get(index + 1).map(String::as_str) == Some("of") {
                            2
                        } else {
                            1
                        };
                    }
                }
            }
        }
        index += 1;
    }

    if recognized == 0 {
        return Err(TimeParseError::Unparseable(phrase.trim().to_string()));
    }
    if explicitly_past {
        return Err(TimeParseError::PastTime);
    }

    let today = local_now.date_naive();
    let date = match date_spec {
        DateSpec::None | DateSpec::Today => today,
        DateSpec::Tomorrow => today
            .checked_add_days(Days::new(1))
            .ok_or(TimeParseError::PastTime)?,
        DateSpec::Weekday(weekday) => next_occurrence_of(today, weekday),
        DateSpec::MonthDay { month, day } => NaiveDate::from_ymd_opt(today.year(), month, day)
            .ok_or_else(|| TimeParseError::Unparseable(phrase.trim().to_string()))?,
        DateSpec::Absolute(date) => date,
    };

    let time = time_spec
        .or(default_time)
        .unwrap_or_else(|| {
            if keep_wall_clock || date_spec == DateSpec::None {
                local_now.time()
            } else {
                NaiveTime::from_hms_opt(0, 0, 0).unwrap()
            }
        });

    let resolved = to_utc(&tz, date, time)
        .ok_or_else(|| TimeParseError::Unparseable(phrase.trim().to_string()))?;
    if resolved > now {
        return Ok(resolved);
    }

    // Future bias for phrases that name a recurring point rather than a
    // fixed calendar date.
    let advanced = match date_spec {
        DateSpec::Weekday(_) => date.checked_add_days(Days::new(7)).map(|date| (date, time)),
        DateSpec::None => date.checked_add_days(Days::new(1)).map(|date| (date, time)),
        DateSpec::MonthDay { month, day } => {
            NaiveDate::from_ymd_opt(today.year() + 1, month, day).map(|date| (date, time))
        }
        _ => None,
    };

    match advanced {
        Some((date, time)) => {
            let resolved = to_utc(&tz, date, time)
                .ok_or_else(|| TimeParseError::Unparseable(phrase.trim().to_string()))?;
            if resolved > now {
                Ok(resolved)
            } else {
                Err(TimeParseError::PastTime)
            }
        }
        None => Err(TimeParseError::PastTime),
    }
}

/// `<Weekday>, <Month> <Day> at <h>:<mm><am|pm> <tz-abbreviation>`
pub fn format_pretty(local: DateTime<Tz>) -> String {
    let hour = match local.hour() % 12 {
        0 => 12,
        hour => hour,
    };
    let meridiem = if local.hour() < 12 { "am" } else { "pm" };

    format!(
        "{}, {} {} at {}:{:02}{} {}",
        local.format("%A"),
        local.format("%B"),
        local.day(),
        hour,
        local.minute(),
        meridiem,
        local.format("%Z"),
    )
}

fn to_utc(tz: &Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    let local = date.and_time(time);
    resolve_local_datetime(tz, local)
        .or_else(|| {
            // Wall clock skipped by a DST gap; slide forward one hour.
            resolve_local_datetime(tz, local + Duration::hours(1))
        })
        .map(|resolved| resolved.to_utc())
}

fn next_occurrence_of(today: NaiveDate, weekday: Weekday) -> NaiveDate {
    let ahead = (weekday.num_days_from_monday() + 7 - today.weekday().num_days_from_monday()) % 7;
    today + Days::new(u64::from(ahead))
}

fn parse_offset(rest: &str) -> Option<Duration> {
    let mut parts = rest.split_whitespace();
    let amount_token = parts.next()?;
    let amount: i64 = match amount_token {
        "a" | "an" | "one" => 1,
        "two" => 2,
        "three" => 3,
        other => other.parse().ok()?,
    };
    let unit = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    offset_from(amount, unit)
}

fn offset_from(amount: i64, unit: &str) -> Option<Duration> {
    // try_* constructors reject magnitudes chrono cannot represent.
    match unit.trim_end_matches('s') {
        "minute" | "min" => Duration::try_minutes(amount),
        "hour" | "hr" => Duration::try_hours(amount),
        "day" => Duration::try_days(amount),
        "week" => Duration::try_weeks(amount),
        _ => None,
    }
}

fn parse_weekday(token: &str) -> Option<Weekday> {
    match token {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" | "tues" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" | "thur" | "thurs" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

fn parse_month(token: &str) -> Option<u32> {
    match token {
        "january" | "jan" => Some(1),
        "february" | "feb" => Some(2),
        "march" | "mar" => Some(3),
        "april" | "apr" => Some(4),
        "may" => Some(5),
        "june" | "jun" => Some(6),
        "july" | "jul" => Some(7),
        "august" | "aug" => Some(8),
        "september" | "sep" | "sept" => Some(9),
        "october" | "oct" => Some(10),
        "november" | "nov" => Some(11),
        "december" | "dec" => Some(12),
        _ => None,
    }
}

fn parse_day_of_month(token: &str) -> Option<u32> {
    let digits = token
        .trim_end_matches("st")
        .trim_end_matches("nd")
        .trim_end_matches("rd")
        .trim_end_matches("th");
    let day: u32 = digits.parse().ok()?;
    (1..=31).contains(&day).then_some(day)
}

fn parse_iso_date(token: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(token, "%Y-%m-%d").ok()
}

fn parse_time_token(token: &str) -> Option<NaiveTime> {
    match token {
        "noon" | "midday" => return NaiveTime::from_hms_opt(12, 0, 0),
        "midnight" => return NaiveTime::from_hms_opt(0, 0, 0),
        _ => {}
    }

    let (clock, meridiem) = if let Some(stripped) = token.strip_suffix("am") {
        (stripped, Some(false))
    } else if let Some(stripped) = token.strip_suffix("pm") {
        (stripped, Some(true))
    } else {
        (token, None)
    };

    let (hour_part, minute_part) = match clock.split_once(':') {
        Some((hour, minute)) => (hour, Some(minute)),
        None => (clock, None),
    };

    let hour: u32 = hour_part.parse().ok()?;
    let minute: u32 = match minute_part {
        Some(minute) => minute.parse().ok()?,
        None => 0,
    };

    match meridiem {
        Some(is_pm) => {
            if hour == 0 || hour > 12 {
                return None;
            }
            let hour24 = match (hour, is_pm) {
                (12, false) => 0,
                (12, true) => 12,
                (hour, false) => hour,
                (hour, true) => hour + 12,
            };
            NaiveTime::from_hms_opt(hour24, minute, 0)
        }
        // A bare number is only a time when it carries minutes ("17:30");
        // "2" alone is a day of month, not two o'clock.
        None => minute_part.and_then(|_| NaiveTime::from_hms_opt(hour, minute, 0)),
    }
}

/// Joins "9 am" into "9am" so a single token parser handles both forms.
fn merge_meridiem_tokens(normalized: &str) -> Vec<String> {
    let raw: Vec<&str> = normalized.split_whitespace().collect();
    let mut merged = Vec::with_capacity(raw.len());
    let mut index = 0;
    while index < raw.len() {
        let token = raw[index];
        let next = raw.get(index + 1).copied();
        if matches!(next, Some("am") | Some("pm"))
            && token.chars().all(|c| c.is_ascii_digit() || c == ':')
            && !token.is_empty()
        {
            merged.push(format!("{token}{}", next.unwrap_or_default()));
            index += 2;
        } else {
            merged.push(token.to_string());
            index += 1;
        }
    }
    merged
}
