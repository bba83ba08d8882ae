use crate::domain::errors::ScheduleError;
use chrono::{DateTime, Datelike, Timelike, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

/// One field of a five-field cron expression
#[derive(Debug, Clone, PartialEq, Eq)]
enum CronField {
    Any,
    /// Sorted, de-duplicated admissible values
    Values(Vec<u32>),
}

impl CronField {
    fn matches(&self, value: u32) -> bool {
        match self {
            CronField::Any => true,
            CronField::Values(values) => values.binary_search(&value).is_ok(),
        }
    }
}

/// Parsed five-field cron expression: minute hour day-of-month month
/// day-of-week. Supports `*`, numbers, ranges (`a-b`), lists (`a,b`) and
/// steps (`*/n`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minute: CronField,
    hour: CronField,
    day_of_month: CronField,
    month: CronField,
    day_of_week: CronField,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(ScheduleError::InvalidCronExpression {
                expression: expression.to_string(),
                reason: format!("expected 5 fields, got {}", parts.len()),
            });
        }

        let field = |spec: &str, min: u32, max: u32| {
            parse_field(spec, min, max).map_err(|reason| ScheduleError::InvalidCronExpression {
                expression: expression.to_string(),
                reason,
            })
        };

        Ok(Self {
            minute: field(parts[0], 0, 59)?,
            hour: field(parts[1], 0, 23)?,
            day_of_month: field(parts[2], 1, 31)?,
            month: field(parts[3], 1, 12)?,
            day_of_week: field(parts[4], 0, 6)?,
        })
    }

    /// Does the schedule fire at this instant (minute resolution)?
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        self.minute.matches(at.minute())
            && self.hour.matches(at.hour())
            && self.day_of_month.matches(at.day())
            && self.month.matches(at.month())
            && self.day_of_week.matches(at.weekday().num_days_from_sunday())
    }
}

fn parse_field(spec: &str, min: u32, max: u32) -> Result<CronField, String> {
    if spec == "*" {
        return Ok(CronField::Any);
    }

    if let Some(step) = spec.strip_prefix("*/") {
        let step: u32 = step
            .parse()
            .map_err(|_| format!("invalid step '{spec}'"))?;
        if step == 0 {
            return Err(format!("step must be non-zero in '{spec}'"));
        }
        let values = (min..=max).filter(|v| (v - min) % step == 0).collect();
        return Ok(CronField::Values(values));
    }

    let mut values = Vec::new();
    for part in spec.split(',') {
        if let Some((lo, hi)) = part.split_once('-') {
            let lo: u32 = lo.parse().map_err(|_| format!("invalid range '{part}'"))?;
            let hi: u32 = hi.parse().map_err(|_| format!("invalid range '{part}'"))?;
            if lo > hi {
                return Err(format!("range is inverted in '{part}'"));
            }
            for v in lo..=hi {
                values.push(v);
            }
        } else {
            values.push(
                part.parse()
                    .map_err(|_| format!("invalid value '{part}'"))?,
            );
        }
    }

    if let Some(bad) = values.iter().find(|v| **v < min || **v > max) {
        return Err(format!("value {bad} outside {min}..={max} in '{spec}'"));
    }
    values.sort_unstable();
    values.dedup();
    Ok(CronField::Values(values))
}

/// Registry of running scheduler jobs, cancellable by id.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job_id: String, handle: JoinHandle<()>) {
        let mut jobs = self.lock();
        // Replace an existing job under the same id
        if let Some(old) = jobs.insert(job_id, handle) {
            old.abort();
        }
    }

    /// Cancel a job by id. Idempotent: unknown ids return false.
    pub fn cancel(&self, job_id: &str) -> bool {
        match self.lock().remove(job_id) {
            Some(handle) => {
                handle.abort();
                info!("Scheduler: cancelled job {job_id}");
                true
            }
            None => false,
        }
    }

    /// Abort every running job
    pub fn shutdown(&self) {
        let mut jobs = self.lock();
        for (_, handle) in jobs.drain() {
            handle.abort();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_wildcard_matches_everything() {
        let schedule = CronSchedule::parse("* * * * *").unwrap();
        assert!(schedule.matches(at(2025, 6, 2, 14, 37)));
    }

    #[test]
    fn test_fixed_time() {
        // 17:00 every day
        let schedule = CronSchedule::parse("0 17 * * *").unwrap();
        assert!(schedule.matches(at(2025, 6, 2, 17, 0)));
        assert!(!schedule.matches(at(2025, 6, 2, 17, 1)));
        assert!(!schedule.matches(at(2025, 6, 2, 16, 0)));
    }

    #[test]
    fn test_weekday_range() {
        // 2025-06-02 is a Monday (dow 1), 2025-06-07 a Saturday (dow 6)
        let schedule = CronSchedule::parse("0 17 * * 1-5").unwrap();
        assert!(schedule.matches(at(2025, 6, 2, 17, 0)));
        assert!(!schedule.matches(at(2025, 6, 7, 17, 0)));
    }

    #[test]
    fn test_step_field() {
        let schedule = CronSchedule::parse("*/15 * * * *").unwrap();
        assert!(schedule.matches(at(2025, 6, 2, 9, 0)));
        assert!(schedule.matches(at(2025, 6, 2, 9, 45)));
        assert!(!schedule.matches(at(2025, 6, 2, 9, 50)));
    }

    #[test]
    fn test_list_field() {
        let schedule = CronSchedule::parse("0 9,17 * * *").unwrap();
        assert!(schedule.matches(at(2025, 6, 2, 9, 0)));
        assert!(schedule.matches(at(2025, 6, 2, 17, 0)));
        assert!(!schedule.matches(at(2025, 6, 2, 12, 0)));
    }

    #[test]
    fn test_invalid_expressions_rejected_at_parse() {
        for bad in [
            "* * * *",
            "* * * * * *",
            "60 * * * *",
            "* 24 * * *",
            "x * * * *",
            "*/0 * * * *",
            "5-1 * * * *",
            "* * 0 * *",
        ] {
            assert!(
                matches!(
                    CronSchedule::parse(bad),
                    Err(ScheduleError::InvalidCronExpression { .. })
                ),
                "'{bad}' should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_job_registry_cancel_is_idempotent() {
        let registry = JobRegistry::new();
        let handle = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        });
        registry.insert("job_1".to_string(), handle);
        assert_eq!(registry.len(), 1);

        assert!(registry.cancel("job_1"));
        assert!(!registry.cancel("job_1"));
        assert!(registry.is_empty());
    }
}
