//! Turns a whole minute into the words printed on its label.
//!
//! The language is resolved once, when the formatter is built, into a plain
//! function pointer. Call sites never branch on the language again.

use crate::common::MinuteIndex;
use chrono::{TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use std::fmt;
use tracing::warn;

/// The phrasing conventions the clock can print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum Language {
    /// "Quarter after 3", "3 thirty", "One minute to 4".
    #[default]
    EnUs,
    /// "quarter past 3", "half past 3", "1 minute to 4".
    EnGb,
}

impl Language {
    /// Parses a language tag, case-insensitively. Unknown tags fall back to
    /// en-US with a warning.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "en-us" => Language::EnUs,
            "en-gb" => Language::EnGb,
            other => {
                warn!("Unsupported language: {other}, defaulting to en-US.");
                Language::EnUs
            }
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Language::EnUs => "en-US",
            Language::EnGb => "en-GB",
        }
    }

    fn phrase_fn(self) -> fn(u32, u32) -> String {
        match self {
            Language::EnUs => phrase_en_us,
            Language::EnGb => phrase_en_gb,
        }
    }
}

impl From<String> for Language {
    fn from(tag: String) -> Self {
        Language::from_tag(&tag)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Formats minutes for one language in one timezone.
#[derive(Clone, Copy)]
pub struct TimeFormatter {
    language: Language,
    timezone: Tz,
    phrase: fn(u32, u32) -> String,
}

impl TimeFormatter {
    pub fn new(language: Language, timezone: Tz) -> Self {
        Self {
            language,
            timezone,
            phrase: language.phrase_fn(),
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Formats anything that carries an hour and a minute. Seconds are ignored.
    pub fn format<T: Timelike>(&self, time: &T) -> String {
        (self.phrase)(time.hour(), time.minute())
    }

    /// Formats the wall-clock time at which `minute` starts, in the
    /// formatter's timezone.
    pub fn format_minute(&self, minute: MinuteIndex) -> String {
        match Utc.timestamp_millis_opt(minute.start_ms()).single() {
            Some(utc) => self.format(&utc.with_timezone(&self.timezone)),
            None => {
                // Outside chrono's range; fall back to UTC arithmetic.
                let minute_of_day = minute.0.rem_euclid(24 * 60);
                (self.phrase)((minute_of_day / 60) as u32, (minute_of_day % 60) as u32)
            }
        }
    }
}

impl fmt::Debug for TimeFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeFormatter")
            .field("language", &self.language)
            .field("timezone", &self.timezone)
            .finish()
    }
}

/// Spells out 1..=59 ("Twenty Four"). Zero is never printed on a label.
pub fn number_to_words(n: u32) -> String {
    const ONES: [&str; 20] = [
        "Zero", "One", "Two", "Three", "Four", "Five", "Six", "Seven", "Eight", "Nine", "Ten",
        "Eleven", "Twelve", "Thirteen", "Fourteen", "Fifteen", "Sixteen", "Seventeen",
        "Eighteen", "Nineteen",
    ];
    const TENS: [&str; 6] = ["", "", "Twenty", "Thirty", "Forty", "Fifty"];

    match n {
        0..=19 => ONES[n as usize].to_string(),
        20..=59 => {
            let tens = TENS[(n / 10) as usize];
            match n % 10 {
                0 => tens.to_string(),
                ones => format!("{tens} {}", ONES[ones as usize]),
            }
        }
        _ => n.to_string(),
    }
}

fn twelve_hour(h24: u32) -> u32 {
    match h24 % 12 {
        0 => 12,
        h => h,
    }
}

/// en-US: minute 30 is its own literal ("3 thirty"); after it, count down
/// "to" the next hour.
fn phrase_en_us(h24: u32, minute: u32) -> String {
    let hour = twelve_hour(h24);
    let next_hour = twelve_hour(h24 + 1);

    match minute {
        0 => format!("{hour} o'clock"),
        30 => format!("{hour} thirty"),
        15 => format!("Quarter after {hour}"),
        45 => format!("Quarter to {next_hour}"),
        m if m > 30 => format!("{} to {next_hour}", minutes_in_words(60 - m)),
        m => format!("{} after {hour}", minutes_in_words(m)),
    }
}

fn minutes_in_words(m: u32) -> String {
    if m == 1 {
        "One minute".to_string()
    } else {
        format!("{} minutes", number_to_words(m))
    }
}

/// en-GB: minute 30 belongs to the "past" side ("half past 3").
fn phrase_en_gb(h24: u32, minute: u32) -> String {
    let past = minute <= 30;
    let (hour, minute, joiner) = if past {
        (twelve_hour(h24), minute, "past")
    } else {
        (twelve_hour(h24 + 1), 60 - minute, "to")
    };

    // widest output: "24 minutes past 12"
    match minute {
        0 => format!("{hour} o'clock"),
        15 => format!("quarter {joiner} {hour}"),
        30 => format!("half {joiner} {hour}"),
        m if m % 5 == 0 => format!("{m} {joiner} {hour}"),
        1 => format!("1 minute {joiner} {hour}"),
        m => format!("{m} minutes {joiner} {hour}"),
    }
}
