//! Query interval calculation
//!
//! Each panel gets an interval derived from the time range and its maximum
//! number of data points, never finer than the minimum interval configured
//! on the datasource or overridden by the query.

use crate::error::{Error, Result};
use crate::model::TimeRange;
use std::time::Duration;

/// Resolution used when a query does not set `maxDataPoints`
pub const DEFAULT_RESOLUTION: i64 = 1500;

/// Minimum interval when neither query nor datasource set one
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(10);

const MS: u64 = 1;
const SECOND: u64 = 1000 * MS;
const MINUTE: u64 = 60 * SECOND;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const WEEK: u64 = 7 * DAY;
const YEAR: u64 = 365 * DAY;

/// A resolved interval, in the two forms placeholders are substituted with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    /// Human form, e.g. `30s`
    pub text: String,
    pub millis: i64,
}

impl Interval {
    pub fn from_duration(duration: Duration) -> Self {
        Self {
            text: format_duration(duration),
            millis: duration.as_millis() as i64,
        }
    }
}

/// Parse an interval string like `500ms`, `10s`, `1h30m` or `1d`
pub fn parse_duration(input: &str) -> Result<Duration> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInterval("empty interval".to_string()));
    }

    let invalid = || Error::InvalidInterval(format!("cannot parse '{}'", input));
    let mut total: u64 = 0;
    let mut rest = trimmed;

    while !rest.is_empty() {
        let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        if digits == 0 {
            return Err(invalid());
        }
        let value: u64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let (unit, len) = if rest.starts_with("ms") {
            (MS, 2)
        } else {
            match rest.chars().next() {
                Some('s') => (SECOND, 1),
                Some('m') => (MINUTE, 1),
                Some('h') => (HOUR, 1),
                Some('d') => (DAY, 1),
                Some('w') => (WEEK, 1),
                Some('y') => (YEAR, 1),
                _ => return Err(invalid()),
            }
        };
        rest = &rest[len..];

        total = value
            .checked_mul(unit)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(invalid)?;
    }

    Ok(Duration::from_millis(total))
}

/// Format with the largest unit that fits, truncating the remainder
pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis() as u64;
    if ms >= YEAR {
        format!("{}y", ms / YEAR)
    } else if ms >= DAY {
        format!("{}d", ms / DAY)
    } else if ms >= HOUR {
        format!("{}h", ms / HOUR)
    } else if ms >= MINUTE {
        format!("{}m", ms / MINUTE)
    } else if ms >= SECOND {
        format!("{}s", ms / SECOND)
    } else if ms >= MS {
        format!("{}ms", ms)
    } else {
        "1ms".to_string()
    }
}

/// Snap a raw interval to the nearest human-friendly step
pub fn round_interval(duration: Duration) -> Duration {
    let ms = duration.as_millis() as u64;
    let rounded = match ms {
        0..=10 => 1,
        11..=15 => 10,
        16..=35 => 20,
        36..=75 => 50,
        76..=150 => 100,
        151..=350 => 200,
        351..=750 => 500,
        751..=1_500 => SECOND,
        1_501..=3_500 => 2 * SECOND,
        3_501..=7_500 => 5 * SECOND,
        7_501..=12_500 => 10 * SECOND,
        12_501..=17_500 => 15 * SECOND,
        17_501..=25_000 => 20 * SECOND,
        25_001..=45_000 => 30 * SECOND,
        45_001..=90_000 => MINUTE,
        90_001..=210_000 => 2 * MINUTE,
        210_001..=450_000 => 5 * MINUTE,
        450_001..=750_000 => 10 * MINUTE,
        750_001..=1_050_000 => 15 * MINUTE,
        1_050_001..=1_500_000 => 20 * MINUTE,
        1_500_001..=2_700_000 => 30 * MINUTE,
        2_700_001..=5_400_000 => HOUR,
        5_400_001..=9_000_000 => 2 * HOUR,
        9_000_001..=16_200_000 => 3 * HOUR,
        16_200_001..=32_400_000 => 6 * HOUR,
        32_400_001..=86_400_000 => 12 * HOUR,
        86_400_001..=604_800_000 => DAY,
        604_800_001..=1_814_400_000 => WEEK,
        1_814_400_001..=3_628_800_000 => 30 * DAY,
        _ => YEAR,
    };
    Duration::from_millis(rounded)
}

/// Resolve the minimum interval for a query
///
/// A non-empty query override wins over the datasource setting. Both may be
/// written as `>10s`, meaning "at least".
pub fn min_interval(datasource_interval: Option<&str>, query_interval: &str) -> Result<Duration> {
    let chosen = [Some(query_interval), datasource_interval]
        .into_iter()
        .flatten()
        .map(|s| s.trim().trim_start_matches('>'))
        .find(|s| !s.is_empty() && *s != "auto");

    match chosen {
        Some(interval) => parse_duration(interval),
        None => Ok(DEFAULT_MIN_INTERVAL),
    }
}

/// Derives per-query intervals from a time range
#[derive(Debug, Clone)]
pub struct IntervalCalculator {
    default_resolution: i64,
}

impl Default for IntervalCalculator {
    fn default() -> Self {
        Self {
            default_resolution: DEFAULT_RESOLUTION,
        }
    }
}

impl IntervalCalculator {
    pub fn new(default_resolution: i64) -> Self {
        Self {
            default_resolution: default_resolution.max(1),
        }
    }

    pub fn calculate(
        &self,
        time_range: &TimeRange,
        min_interval: Duration,
        max_data_points: i64,
    ) -> Interval {
        let resolution = if max_data_points > 0 {
            max_data_points
        } else {
            self.default_resolution
        };

        let raw = Duration::from_millis((time_range.span_millis() / resolution) as u64);
        if raw < min_interval {
            return Interval::from_duration(min_interval);
        }

        Interval::from_duration(round_interval(raw))
    }
}
