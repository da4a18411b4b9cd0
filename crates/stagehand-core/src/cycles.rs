use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use std::fmt;

use crate::dates::{self, Frequency};
use crate::errors::ConfigError;
use crate::model::Params;

/// One time-point or time-interval replication unit of the cycles stage.
///
/// Neighbours are stored as indices into the list returned by
/// [`gen_cycles`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    pub begin_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub label: String,
    pub token: String,
    pub is_first: bool,
    pub is_last: bool,
    pub prev: Option<usize>,
    pub next: Option<usize>,
}

impl Cycle {
    pub fn new(begin_date: DateTime<Utc>, end_date: Option<DateTime<Utc>>) -> Self {
        let (label, token) = match end_date {
            Some(end) => (
                format!(
                    "{} -> {} ({})",
                    dates::date_iso(&begin_date),
                    dates::date_iso(&end),
                    dates::format_duration(&(end - begin_date))
                ),
                format!(
                    "{}-{}",
                    dates::date_token(&begin_date),
                    dates::date_token(&end)
                ),
            ),
            None => (dates::date_iso(&begin_date), dates::date_token(&begin_date)),
        };
        Self {
            begin_date,
            end_date,
            label,
            token,
            is_first: false,
            is_last: false,
            prev: None,
            next: None,
        }
    }

    pub fn is_interval(&self) -> bool {
        self.end_date.is_some()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.end_date.map(|end| end - self.begin_date)
    }

    /// Substitution parameters describing this cycle.
    ///
    /// A non-empty `suffix` is appended to every key, as in
    /// `cycle_begin_date_prev`.
    pub fn params(&self, suffix: &str) -> Params {
        let sfx = if suffix.is_empty() || suffix.starts_with('_') {
            suffix.to_string()
        } else {
            format!("_{}", suffix)
        };
        let key = |name: &str| format!("{}{}", name, sfx);

        let mut params = Params::new();
        params.insert(key("cycle"), json!(self.token));
        params.insert(
            key("cycle_begin_date"),
            json!(dates::date_iso(&self.begin_date)),
        );
        params.insert(key("cycle_label"), json!(self.label));
        params.insert(key("cycle_token"), json!(self.token));
        match (self.end_date, self.duration()) {
            (Some(end), Some(duration)) => {
                params.insert(key("cycle_end_date"), json!(dates::date_iso(&end)));
                params.insert(
                    key("cycle_duration"),
                    json!(dates::format_duration(&duration)),
                );
            }
            _ => {
                params.insert(
                    key("cycle_date"),
                    json!(dates::date_iso(&self.begin_date)),
                );
            }
        }
        params.insert(key("cycle_is_first"), Value::Bool(self.is_first));
        params.insert(key("cycle_is_last"), Value::Bool(self.is_last));
        params
    }
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

/// Time settings of the cycles stage.
#[derive(Debug, Clone, Default)]
pub struct CycleSpec {
    pub begin_date: Option<String>,
    pub end_date: Option<String>,
    pub freq: Option<String>,
    pub ncycles: Option<u32>,
    pub round: Option<String>,
    pub as_intervals: bool,
}

fn evenly_spaced(
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
    ncycles: u32,
) -> Vec<DateTime<Utc>> {
    let span = end - begin;
    let total_ms = span.num_milliseconds();
    (0..=ncycles)
        .map(|i| {
            if i == ncycles {
                end
            } else {
                begin + Duration::milliseconds(total_ms * i64::from(i) / i64::from(ncycles))
            }
        })
        .collect()
}

fn stepped_until(
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
    freq: &Frequency,
) -> Vec<DateTime<Utc>> {
    let mut dates = Vec::new();
    let mut i = 0;
    while let Some(date) = freq.advance(begin, i) {
        if date > end {
            break;
        }
        dates.push(date);
        i += 1;
    }
    dates
}

fn stepped_count(begin: DateTime<Utc>, count: u32, freq: &Frequency) -> Vec<DateTime<Utc>> {
    (0..count).filter_map(|i| freq.advance(begin, i)).collect()
}

/// Generate the ordered, linked list of cycles described by `spec`.
pub fn gen_cycles(spec: &CycleSpec) -> Result<Vec<Cycle>, ConfigError> {
    let round = spec.round.as_deref().map(str::parse::<Frequency>).transpose()?;
    let snap = |text: &str| -> Result<DateTime<Utc>, ConfigError> {
        let date = dates::parse_date(text)?;
        match &round {
            Some(precision) => dates::round_date(date, precision),
            None => Ok(date),
        }
    };

    let begin = spec
        .begin_date
        .as_deref()
        .ok_or_else(|| ConfigError::Cycles("begin_date is required to generate cycles".into()))
        .and_then(snap)?;
    let freq = spec.freq.as_deref().map(str::parse::<Frequency>).transpose()?;
    let ncycles = spec.ncycles.filter(|n| *n > 0);

    let boundaries = match (spec.end_date.as_deref(), ncycles, freq) {
        (Some(end), Some(n), _) => evenly_spaced(begin, snap(end)?, n),
        (Some(end), None, Some(freq)) => stepped_until(begin, snap(end)?, &freq),
        (Some(end), None, None) => vec![begin, snap(end)?],
        (None, Some(n), Some(freq)) => stepped_count(begin, n + 1, &freq),
        _ => vec![begin],
    };

    let mut cycles: Vec<Cycle> = match boundaries.as_slice() {
        [single] => vec![Cycle::new(*single, None)],
        _ if spec.as_intervals => boundaries
            .windows(2)
            .map(|pair| Cycle::new(pair[0], Some(pair[1])))
            .collect(),
        _ => boundaries.iter().map(|d| Cycle::new(*d, None)).collect(),
    };

    if cycles.is_empty() {
        return Err(ConfigError::Cycles(format!(
            "unable to generate cycles with begin_date={:?}, end_date={:?}, freq={:?}, ncycles={:?}, round={:?}",
            spec.begin_date, spec.end_date, spec.freq, spec.ncycles, spec.round
        )));
    }

    let last = cycles.len() - 1;
    for (i, cycle) in cycles.iter_mut().enumerate() {
        cycle.is_first = i == 0;
        cycle.is_last = i == last;
        cycle.prev = i.checked_sub(1);
        cycle.next = (i < last).then_some(i + 1);
    }

    Ok(cycles)
}
