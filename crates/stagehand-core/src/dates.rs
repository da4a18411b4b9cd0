use chrono::{DateTime, Duration, DurationRound, Months, NaiveDate, NaiveDateTime, Timelike, Utc};
use std::fmt;
use std::str::FromStr;

use crate::errors::ConfigError;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse a date, interpreting naive values as UTC.
pub fn parse_date(text: &str) -> Result<DateTime<Utc>, ConfigError> {
    let text = text.trim();
    match text {
        "now" => return Ok(Utc::now()),
        "today" => {
            let midnight = Utc::now().date_naive().and_hms_opt(0, 0, 0);
            return midnight
                .map(|d| d.and_utc())
                .ok_or_else(|| ConfigError::InvalidDate(text.to_string()));
        }
        _ => {}
    }

    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Ok(date.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(date) = NaiveDateTime::parse_from_str(text, fmt) {
            return Ok(date.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
        .ok_or_else(|| ConfigError::InvalidDate(text.to_string()))
}

/// Snap a date to the nearest multiple of `precision`.
pub fn round_date(date: DateTime<Utc>, precision: &Frequency) -> Result<DateTime<Utc>, ConfigError> {
    let step = precision
        .fixed_duration()
        .ok_or_else(|| ConfigError::InvalidFrequency(precision.to_string()))?;
    date.duration_round(step)
        .map_err(|_| ConfigError::InvalidFrequency(precision.to_string()))
}

/// Filesystem-safe rendering of a date.
pub fn date_token(date: &DateTime<Utc>) -> String {
    if date.num_seconds_from_midnight() == 0 {
        date.format("%Y-%m-%d").to_string()
    } else {
        date.format("%Y-%m-%dT%H-%M-%S").to_string()
    }
}

/// ISO 8601 rendering of a date.
pub fn date_iso(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Human rendering of a duration, e.g. `1 day 06:00:00`.
pub fn format_duration(duration: &Duration) -> String {
    let days = duration.num_days();
    let rest = *duration - Duration::days(days);
    let secs = rest.num_seconds();
    let hms = format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60);
    match days {
        0 => hms,
        1 => format!("1 day {}", hms),
        n => format!("{} days {}", n, hms),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    MonthStart,
}

/// A cycling frequency such as `6H` or `1D`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frequency {
    pub count: u32,
    pub unit: FrequencyUnit,
}

impl Frequency {
    pub fn fixed_duration(&self) -> Option<Duration> {
        let n = i64::from(self.count);
        match self.unit {
            FrequencyUnit::Seconds => Some(Duration::seconds(n)),
            FrequencyUnit::Minutes => Some(Duration::minutes(n)),
            FrequencyUnit::Hours => Some(Duration::hours(n)),
            FrequencyUnit::Days => Some(Duration::days(n)),
            FrequencyUnit::Weeks => Some(Duration::weeks(n)),
            FrequencyUnit::MonthStart => None,
        }
    }

    /// Advance `date` by `times` steps.
    pub fn advance(&self, date: DateTime<Utc>, times: u32) -> Option<DateTime<Utc>> {
        match self.fixed_duration() {
            Some(step) => date.checked_add_signed(step * i32::try_from(times).ok()?),
            None => date.checked_add_months(Months::new(self.count.checked_mul(times)?)),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            FrequencyUnit::Seconds => "s",
            FrequencyUnit::Minutes => "min",
            FrequencyUnit::Hours => "h",
            FrequencyUnit::Days => "D",
            FrequencyUnit::Weeks => "W",
            FrequencyUnit::MonthStart => "MS",
        };
        write!(f, "{}{}", self.count, unit)
    }
}

impl FromStr for Frequency {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let split = text
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(text.len());
        let (digits, unit) = text.split_at(split);
        let count = if digits.is_empty() {
            1
        } else {
            digits
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidFrequency(s.to_string()))?
        };
        let unit = match unit.trim() {
            "s" | "S" => FrequencyUnit::Seconds,
            "min" | "T" => FrequencyUnit::Minutes,
            "h" | "H" => FrequencyUnit::Hours,
            "d" | "D" => FrequencyUnit::Days,
            "w" | "W" => FrequencyUnit::Weeks,
            "MS" => FrequencyUnit::MonthStart,
            _ => return Err(ConfigError::InvalidFrequency(s.to_string())),
        };
        if count == 0 {
            return Err(ConfigError::InvalidFrequency(s.to_string()));
        }
        Ok(Frequency { count, unit })
    }
}
