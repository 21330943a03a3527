//! Free-text parsing for timer durations, clock times and alarm indices

use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Days, TimeZone};
use regex::Regex;

static DURATION_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(\d+|an?|one|two|three|four|five|six|seven|eight|nine)\s*(hours?|hrs?|minutes?|mins?|seconds?|secs?)\b",
    )
    .expect("valid regex")
});

static CLOCK_COLON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2}):(\d{2})(?:\s*([ap])\.?\s?m\b)?").expect("valid regex")
});

static CLOCK_MERIDIEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s*(?:([ap])\.?\s?m\b|o'?clock\b)").expect("valid regex")
});

fn small_number(word: &str) -> Option<u64> {
    let n = match word.to_ascii_lowercase().as_str() {
        "a" | "an" | "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        digits => return digits.parse().ok(),
    };
    Some(n)
}

fn unit_seconds(unit: &str) -> u64 {
    match unit.to_ascii_lowercase().chars().next() {
        Some('h') => 3600,
        Some('m') => 60,
        _ => 1,
    }
}

/// Sum every magnitude/unit pair in `text`
///
/// Returns `None` when no pair is present or the total is zero.
#[must_use]
pub fn parse_duration(text: &str) -> Option<Duration> {
    let mut total: u64 = 0;
    let mut found = false;

    for caps in DURATION_PAIR.captures_iter(text) {
        let magnitude = small_number(&caps[1])?;
        total = total.saturating_add(magnitude.saturating_mul(unit_seconds(&caps[2])));
        found = true;
    }

    (found && total > 0).then(|| Duration::from_secs(total))
}

/// Hour and minute named in `text` (24-hour clock)
///
/// Accepts `7:30`, `7:30 pm`, `7 am`, `7 o'clock`.
#[must_use]
pub fn parse_clock(text: &str) -> Option<(u32, u32)> {
    let (hour, minute, meridiem) = if let Some(caps) = CLOCK_COLON.captures(text) {
        (
            caps[1].parse::<u32>().ok()?,
            caps[2].parse::<u32>().ok()?,
            caps.get(3).map(|m| m.as_str().to_ascii_lowercase()),
        )
    } else {
        let caps = CLOCK_MERIDIEM.captures(text)?;
        (
            caps[1].parse::<u32>().ok()?,
            0,
            caps.get(2).map(|m| m.as_str().to_ascii_lowercase()),
        )
    };

    if minute > 59 {
        return None;
    }

    let hour = match meridiem.as_deref() {
        Some(m) => {
            if !(1..=12).contains(&hour) {
                return None;
            }
            match (m, hour) {
                ("a", 12) => 0,
                ("p", h) if h < 12 => h + 12,
                (_, h) => h,
            }
        }
        None if hour < 24 => hour,
        None => return None,
    };

    Some((hour, minute))
}

/// The next instant strictly after `now` showing `hour:minute` on the wall clock
#[must_use]
pub fn next_occurrence<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32, minute: u32) -> Option<DateTime<Tz>> {
    let tz = now.timezone();
    let today = now.date_naive().and_hms_opt(hour, minute, 0)?;
    let candidate = tz.from_local_datetime(&today).earliest()?;
    if candidate > *now {
        return Some(candidate);
    }
    let tomorrow = today.checked_add_days(Days::new(1))?;
    tz.from_local_datetime(&tomorrow).earliest()
}

/// Delay until a named clock time, relative to `now`
#[must_use]
pub fn delay_until_clock<Tz: TimeZone>(text: &str, now: &DateTime<Tz>) -> Option<Duration> {
    let (hour, minute) = parse_clock(text)?;
    let target = next_occurrence(now, hour, minute)?;
    target.signed_duration_since(now.clone()).to_std().ok()
}

fn index_word(word: &str) -> Option<usize> {
    let n = match word {
        "one" | "first" => 1,
        "two" | "second" => 2,
        "three" | "third" => 3,
        "four" | "fourth" => 4,
        "five" | "fifth" => 5,
        "six" | "sixth" => 6,
        "seven" | "seventh" => 7,
        "eight" | "eighth" => 8,
        "nine" | "ninth" => 9,
        "ten" | "tenth" => 10,
        other => {
            let digits = other
                .strip_suffix("st")
                .or_else(|| other.strip_suffix("nd"))
                .or_else(|| other.strip_suffix("rd"))
                .or_else(|| other.strip_suffix("th"))
                .unwrap_or(other);
            return digits.parse().ok();
        }
    };
    Some(n)
}

/// First cardinal, ordinal or numeral in `text`, as a 1-based index
#[must_use]
pub fn parse_index(text: &str) -> Option<usize> {
    text.split_whitespace()
        .map(crate::intent::normalize_token)
        .find_map(|w| index_word(&w))
}

/// Spoken form of a delay: "1 hour and 30 minutes"
#[must_use]
pub fn describe_delay(delay: Duration) -> String {
    let secs = delay.as_secs();
    let parts: Vec<String> = [(secs / 3600, "hour"), (secs % 3600 / 60, "minute"), (secs % 60, "second")]
        .into_iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, unit)| if n == 1 { format!("1 {unit}") } else { format!("{n} {unit}s") })
        .collect();

    match parts.as_slice() {
        [] => "0 seconds".to_string(),
        [one] => one.clone(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}
