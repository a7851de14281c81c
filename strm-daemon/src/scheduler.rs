//! Cron-driven full-pass triggers, evaluated in local time.

use std::str::FromStr;

use chrono::{DateTime, Local};
use cron::Schedule;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::DaemonError;
use crate::worker::{request_pass, Trigger};

/// A parsed cron expression.
///
/// Accepts classic 5-field crontab lines (`min hour dom month dow`) as well as
/// the 6/7-field form with seconds (and year) understood by the `cron` crate.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: Schedule,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, DaemonError> {
        let trimmed = expression.trim();
        let fields = trimmed.split_whitespace().count();
        let full = if fields == 5 {
            let mut parts: Vec<&str> = trimmed.split_whitespace().collect();
            let dow = crontab_day_of_week(parts[4]).map_err(|reason| DaemonError::Schedule {
                expression: expression.to_string(),
                reason,
            })?;
            parts[4] = &dow;
            format!("0 {}", parts.join(" "))
        } else {
            trimmed.to_string()
        };
        let schedule = Schedule::from_str(&full).map_err(|err| DaemonError::Schedule {
            expression: expression.to_string(),
            reason: err.to_string(),
        })?;
        Ok(Self {
            expression: trimmed.to_string(),
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `now`.
    pub fn next_after(&self, now: &DateTime<Local>) -> Option<DateTime<Local>> {
        self.schedule.after(now).next()
    }
}

/// Rewrite a crontab day-of-week field (0-7, 0 and 7 are Sunday) into the
/// `cron` crate's numbering (1-7, 1 is Sunday). Names pass through.
fn crontab_day_of_week(field: &str) -> Result<String, String> {
    if field == "*" || field == "?" {
        return Ok(field.to_string());
    }
    let mut names = Vec::new();
    let mut days = std::collections::BTreeSet::new();
    for item in field.split(',') {
        if item.chars().any(|c| c.is_ascii_alphabetic()) {
            names.push(item.to_string());
            continue;
        }
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: usize = step.parse().map_err(|_| format!("bad day-of-week step {item:?}"))?;
                (range, Some(step))
            }
            None => (item, None),
        };
        let day = |raw: &str| -> Result<u32, String> {
            match raw.parse::<u32>() {
                Ok(day) if day <= 7 => Ok(day),
                _ => Err(format!("day-of-week {raw:?} is not in 0-7")),
            }
        };
        let (first, last) = match range.split_once('-') {
            _ if range == "*" => (0, 6),
            Some((first, last)) => (day(first)?, day(last)?),
            None if step.is_some() => (day(range)?, 6),
            None => (day(range)?, day(range)?),
        };
        if first > last || step == Some(0) {
            return Err(format!("bad day-of-week range {item:?}"));
        }
        days.extend(
            (first..=last)
                .step_by(step.unwrap_or(1))
                .map(|day| day % 7 + 1),
        );
    }
    Ok(days
        .iter()
        .map(u32::to_string)
        .chain(names)
        .collect::<Vec<_>>()
        .join(","))
}

/// Sleep until each fire time, then request a pass from every mapping worker.
pub async fn scheduler_task(
    schedule: CronSchedule,
    workers: Vec<mpsc::Sender<Trigger>>,
    cancel: CancellationToken,
) -> Result<(), DaemonError> {
    tracing::info!(expression = schedule.expression(), "cron schedule loaded");
    loop {
        let now = Local::now();
        let Some(next) = schedule.next_after(&now) else {
            tracing::warn!(expression = schedule.expression(), "cron schedule has no future fire time");
            cancel.cancelled().await;
            return Ok(());
        };
        let wait = (next - now).to_std().unwrap_or_default();
        tracing::debug!(next = %next, "next scheduled full pass");

        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(wait) => {}
        }
        tracing::info!("scheduled full pass");
        for worker in &workers {
            request_pass(worker, Trigger::Cron);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike, Weekday};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 3, 12, h, m, s)
            .single()
            .expect("unambiguous local time")
    }

    #[test]
    fn five_field_expression_fires_on_the_minute() {
        let schedule = CronSchedule::parse("*/30 * * * *").unwrap();
        let next = schedule.next_after(&at(10, 7, 12)).unwrap();
        assert_eq!((next.hour(), next.minute(), next.second()), (10, 30, 0));
    }

    #[test]
    fn daily_expression_rolls_to_next_day() {
        let schedule = CronSchedule::parse("0 3 * * *").unwrap();
        let next = schedule.next_after(&at(4, 0, 0)).unwrap();
        assert_eq!(next.date_naive(), at(4, 0, 0).date_naive().succ_opt().unwrap());
        assert_eq!(next.hour(), 3);
    }

    #[test]
    fn six_field_expression_keeps_seconds() {
        let schedule = CronSchedule::parse("15 0 12 * * *").unwrap();
        let next = schedule.next_after(&at(11, 0, 0)).unwrap();
        assert_eq!((next.hour(), next.minute(), next.second()), (12, 0, 15));
    }

    #[test]
    fn crontab_sunday_is_zero_or_seven() {
        // 2024-03-12 is a Tuesday.
        for expr in ["0 3 * * 0", "0 3 * * 7", "0 3 * * SUN"] {
            let next = CronSchedule::parse(expr).unwrap().next_after(&at(10, 0, 0)).unwrap();
            assert_eq!(next.weekday(), Weekday::Sun, "{expr}");
            assert_eq!(next.day(), 17, "{expr}");
        }
    }

    #[test]
    fn crontab_one_is_monday() {
        let next = CronSchedule::parse("* * * * 1")
            .unwrap()
            .next_after(&at(10, 0, 0))
            .unwrap();
        assert_eq!(next.weekday(), Weekday::Mon);
        assert_eq!((next.day(), next.hour(), next.minute()), (18, 0, 0));
    }

    #[test]
    fn weekday_range_skips_the_weekend() {
        let schedule = CronSchedule::parse("0 3 * * 1-5").unwrap();
        // Friday 2024-03-15 after 03:00 rolls over to Monday.
        let friday = Local.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).single().unwrap();
        let next = schedule.next_after(&friday).unwrap();
        assert_eq!(next.weekday(), Weekday::Mon);
    }

    #[test]
    fn day_of_week_lists_ranges_and_steps_are_renumbered() {
        assert_eq!(crontab_day_of_week("0").unwrap(), "1");
        assert_eq!(crontab_day_of_week("5-7").unwrap(), "1,6,7");
        assert_eq!(crontab_day_of_week("1,3").unwrap(), "2,4");
        assert_eq!(crontab_day_of_week("*/2").unwrap(), "1,3,5,7");
        assert_eq!(crontab_day_of_week("MON-FRI").unwrap(), "MON-FRI");
        assert!(crontab_day_of_week("8").is_err());
        assert!(CronSchedule::parse("0 3 * * 9").is_err());
    }

    #[test]
    fn garbage_is_rejected_with_expression() {
        let err = CronSchedule::parse("every tuesday").unwrap_err();
        assert!(matches!(err, DaemonError::Schedule { .. }));
        assert!(err.to_string().contains("every tuesday"));
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_stops_on_cancel() {
        let schedule = CronSchedule::parse("0 0 1 1 *").unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(scheduler_task(schedule, vec![tx], cancel.clone()));
        cancel.cancel();
        task.await.unwrap().unwrap();
    }
}
