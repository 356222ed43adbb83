// ── Script schedules ──
//
// Accepted forms:
//   - 5-field cron (`*/5 * * * *`), seconds assumed zero
//   - 6/7-field cron with seconds (and optional year)
//   - `@yearly`, `@annually`, `@monthly`, `@weekly`, `@daily`, `@midnight`, `@hourly`
//   - `@every <duration>` with a humantime duration (`@every 30s`, `@every 1h 30m`)

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::CoreError;

#[derive(Debug, Clone)]
pub enum Schedule {
    Cron {
        expr: String,
        schedule: Box<cron::Schedule>,
    },
    Every(Duration),
}

impl Schedule {
    pub fn parse(expr: &str) -> Result<Self, CoreError> {
        let expr = expr.trim();
        let err = |reason: String| CoreError::ParseSchedule {
            expr: expr.to_owned(),
            reason,
        };

        if expr.is_empty() {
            return Err(err("empty schedule".into()));
        }

        if let Some(rest) = expr.strip_prefix("@every") {
            let every = humantime::parse_duration(rest.trim()).map_err(|e| err(e.to_string()))?;
            if every.is_zero() {
                return Err(err("interval must be greater than zero".into()));
            }
            return Ok(Self::Every(every));
        }

        let normalized = match expr {
            "@yearly" | "@annually" => "0 0 0 1 1 *".to_owned(),
            "@monthly" => "0 0 0 1 * *".to_owned(),
            "@weekly" => "0 0 0 * * Sun".to_owned(),
            "@daily" | "@midnight" => "0 0 0 * * *".to_owned(),
            "@hourly" => "0 0 * * * *".to_owned(),
            other if other.starts_with('@') => {
                return Err(err(format!("unknown descriptor {other}")));
            }
            other => match other.split_whitespace().count() {
                5 => format!("0 {other}"),
                6 | 7 => other.to_owned(),
                n => return Err(err(format!("expected 5 to 7 fields, found {n}"))),
            },
        };

        let schedule = cron::Schedule::from_str(&normalized).map_err(|e| err(e.to_string()))?;
        Ok(Self::Cron {
            expr: expr.to_owned(),
            schedule: Box::new(schedule),
        })
    }

    /// Next fire time strictly after `after`, or `None` if the schedule
    /// never fires again.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron { schedule, .. } => schedule.after(&after).next(),
            Self::Every(every) => chrono::Duration::from_std(*every)
                .ok()
                .and_then(|d| after.checked_add_signed(d)),
        }
    }

    /// How long to wait from `now` until the next fire.
    pub fn until_next(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self {
            Self::Every(every) => Some(*every),
            Self::Cron { .. } => {
                let next = self.next_after(now)?;
                Some((next - now).to_std().unwrap_or(Duration::ZERO))
            }
        }
    }
}

impl FromStr for Schedule {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cron { expr, .. } => f.write_str(expr),
            Self::Every(every) => write!(f, "@every {}", humantime::format_duration(*every)),
        }
    }
}
