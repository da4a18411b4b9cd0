use chrono::Duration;

pub mod background;
pub mod pbspro;
pub mod slurm;

const TIME_SENTINELS: &[&str] = &["", "--", "--:--", "INVALID", "N/A"];

/// How a two-field clock such as `12:34` is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockPair {
    MinutesSeconds,
    HoursMinutes,
}

/// Parse scheduler elapsed time: `[D-]H:M:S`, a two-field clock or seconds.
///
/// Sentinels and garbage yield `None`, meaning "leave the time unchanged".
pub fn parse_elapsed(text: &str, pair: ClockPair) -> Option<Duration> {
    let text = text.trim();
    if TIME_SENTINELS.contains(&text) {
        return None;
    }

    let (days, clock) = match text.split_once('-') {
        Some((d, rest)) => (d.parse::<i64>().ok()?, rest),
        None => (0, text),
    };

    let fields: Vec<i64> = clock
        .split(':')
        .map(|f| f.parse::<i64>().ok())
        .collect::<Option<_>>()?;

    let (h, m, s) = match (fields.as_slice(), pair) {
        ([s], _) => (0, 0, *s),
        ([a, b], ClockPair::MinutesSeconds) => (0, *a, *b),
        ([a, b], ClockPair::HoursMinutes) => (*a, *b, 0),
        ([h, m, s], _) => (*h, *m, *s),
        _ => return None,
    };

    Some(Duration::days(days) + Duration::hours(h) + Duration::minutes(m) + Duration::seconds(s))
}

/// True when every needle of any marker group occurs in `content`.
pub fn has_failure_marker(content: &str, markers: &[&[&str]]) -> bool {
    markers
        .iter()
        .any(|group| !group.is_empty() && group.iter().all(|needle| content.contains(needle)))
}
