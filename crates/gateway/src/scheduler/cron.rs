//! Cron expression evaluation (5-field: min hour dom month dow, UTC)
//! plus the `@every <duration>` shorthand used for sub-minute cadences.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use gort_domain::{Error, Result};

/// A parsed schedule cadence.
#[derive(Clone, Debug, PartialEq)]
pub enum CronSpec {
    /// `@every 10s`, `@every 5m`, `@every 1h` — fixed interval.
    Every(Duration),
    /// Standard 5-field expression, evaluated in UTC.
    Fields(String),
}

impl CronSpec {
    /// Parse and validate a schedule expression. Creation-time errors
    /// here are what keeps unparseable rows out of the store.
    pub fn parse(expr: &str) -> Result<Self> {
        let expr = expr.trim();
        if let Some(rest) = expr.strip_prefix("@every") {
            let interval = parse_interval(rest.trim())
                .ok_or_else(|| Error::Unmarshal(format!("bad @every interval: {expr}")))?;
            if interval <= Duration::zero() {
                return Err(Error::Unmarshal(format!("bad @every interval: {expr}")));
            }
            return Ok(Self::Every(interval));
        }

        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(Error::Unmarshal(format!(
                "cron expression must have 5 fields: {expr}"
            )));
        }
        // Probe the matcher once so malformed fields fail at parse time.
        let now = Utc::now();
        let _ = cron_matches(expr, &now);
        Ok(Self::Fields(expr.to_owned()))
    }

    /// Next occurrence strictly after `after`.
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Every(interval) => Some(*after + *interval),
            Self::Fields(expr) => cron_next(expr, after),
        }
    }
}

/// Parse `1s` / `30s` / `5m` / `2h` / `1h30m` into a duration.
fn parse_interval(s: &str) -> Option<Duration> {
    if s.is_empty() {
        return None;
    }
    let mut total = Duration::zero();
    let mut digits = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let n: i64 = digits.parse().ok()?;
        digits.clear();
        total = total
            + match c {
                's' => Duration::seconds(n),
                'm' => Duration::minutes(n),
                'h' => Duration::hours(n),
                _ => return None,
            };
    }
    if !digits.is_empty() {
        return None; // trailing number without a unit
    }
    Some(total)
}

/// Parse a cron field and check if a value matches.
fn cron_field_matches(field: &str, value: u32) -> bool {
    if field == "*" {
        return true;
    }
    // Handle */N (every N)
    if let Some(step) = field.strip_prefix("*/") {
        if let Ok(n) = step.parse::<u32>() {
            return n > 0 && value % n == 0;
        }
    }
    // Handle comma-separated values
    for part in field.split(',') {
        // Handle range N-M
        if let Some((start_s, end_s)) = part.split_once('-') {
            if let (Ok(start), Ok(end)) = (start_s.parse::<u32>(), end_s.parse::<u32>()) {
                if value >= start && value <= end {
                    return true;
                }
            }
        } else if let Ok(n) = part.parse::<u32>() {
            if value == n {
                return true;
            }
        }
    }
    false
}

/// Check if a UTC datetime matches a 5-field cron expression.
pub fn cron_matches(cron: &str, dt: &DateTime<Utc>) -> bool {
    let fields: Vec<&str> = cron.split_whitespace().collect();
    if fields.len() != 5 {
        return false;
    }
    cron_field_matches(fields[0], dt.minute())
        && cron_field_matches(fields[1], dt.hour())
        && cron_field_matches(fields[2], dt.day())
        && cron_field_matches(fields[3], dt.month())
        && cron_field_matches(fields[4], dt.weekday().num_days_from_sunday())
}

/// Compute the next occurrence after `after`, scanning minute by minute
/// for up to one year.
pub fn cron_next(cron: &str, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
    let next_min_secs = 60 - i64::from(after.second());
    let mut candidate = *after + Duration::seconds(next_min_secs);
    candidate = candidate.with_second(0).unwrap_or(candidate);

    let max_checks = 366 * 24 * 60; // one year of minutes
    for _ in 0..max_checks {
        if cron_matches(cron, &candidate) {
            return Some(candidate);
        }
        candidate += Duration::minutes(1);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cron_every_5_minutes() {
        let dt = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
        assert!(cron_matches("*/5 * * * *", &dt));
        let dt2 = Utc.with_ymd_and_hms(2024, 6, 15, 10, 3, 0).unwrap();
        assert!(!cron_matches("*/5 * * * *", &dt2));
    }

    #[test]
    fn cron_specific_time() {
        let dt = Utc.with_ymd_and_hms(2024, 6, 15, 9, 30, 0).unwrap();
        assert!(cron_matches("30 9 * * *", &dt));
        assert!(!cron_matches("30 10 * * *", &dt));
    }

    #[test]
    fn cron_range_and_commas() {
        let dt = Utc.with_ymd_and_hms(2024, 6, 15, 10, 15, 0).unwrap();
        assert!(cron_matches("0,15,30,45 9-17 * * *", &dt));
        let dt2 = Utc.with_ymd_and_hms(2024, 6, 15, 20, 15, 0).unwrap();
        assert!(!cron_matches("0,15,30,45 9-17 * * *", &dt2));
    }

    #[test]
    fn cron_next_finds_occurrence() {
        let after = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
        let next = cron_next("30 * * * *", &after).unwrap();
        assert_eq!(next.minute(), 30);
        assert_eq!(next.hour(), 10);
    }

    #[test]
    fn every_shorthand_parses() {
        assert_eq!(
            CronSpec::parse("@every 1s").unwrap(),
            CronSpec::Every(Duration::seconds(1))
        );
        assert_eq!(
            CronSpec::parse("@every 1h30m").unwrap(),
            CronSpec::Every(Duration::minutes(90))
        );
        assert!(CronSpec::parse("@every").is_err());
        assert!(CronSpec::parse("@every 5x").is_err());
        assert!(CronSpec::parse("@every 10").is_err());
    }

    #[test]
    fn five_field_requirement_is_enforced() {
        assert!(CronSpec::parse("* * * *").is_err());
        assert!(CronSpec::parse("0 9 * * 1-5").is_ok());
    }

    #[test]
    fn every_next_is_interval_after() {
        let spec = CronSpec::parse("@every 10s").unwrap();
        let after = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 5).unwrap();
        assert_eq!(
            spec.next_after(&after).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 15).unwrap()
        );
    }
}
