use crate::config::{ClockTime, ExceptionAction, ScheduleConfig};
use crate::schedule::cron;
use chrono::{Datelike, Local, NaiveDateTime, Timelike, Utc};
use tracing::warn;

/// Decide whether capture should be active at wall-clock time `now`.
///
/// Layers are evaluated in a fixed order and the first one that decides wins:
/// date exceptions, the seasonal rule for the current month, cron patterns
/// (advanced mode only, match falls through on miss), then the weekly window.
pub fn should_capture_be_active(config: &ScheduleConfig, now: NaiveDateTime) -> bool {
    if !config.enabled {
        return true;
    }

    let today = now.date();
    let weekday = now.weekday().num_days_from_sunday() as u8;
    let minute = now.hour() * 60 + now.minute();
    let day_allowed = config.days.contains(&weekday);

    if let Some(exception) = config.exceptions.iter().find(|e| e.applies_to(today)) {
        if exception.action == ExceptionAction::Skip {
            return false;
        }
    }

    if let Some(rule) = config
        .seasonal_rules
        .iter()
        .find(|rule| rule.months.contains(&now.month()))
    {
        return day_allowed && window_contains(rule.start_time, rule.end_time, minute);
    }

    if config.advanced_mode
        && config
            .cron_patterns
            .iter()
            .any(|pattern| cron::hour_matches(pattern, now.hour()))
    {
        return true;
    }

    day_allowed && window_contains(config.start_time, config.end_time, minute)
}

/// Inclusive minute window; `end < start` wraps past midnight
pub fn window_contains(start: ClockTime, end: ClockTime, minute_of_day: u32) -> bool {
    let (start, end) = (start.minutes_of_day(), end.minutes_of_day());
    if start <= end {
        minute_of_day >= start && minute_of_day <= end
    } else {
        minute_of_day >= start || minute_of_day <= end
    }
}

impl ScheduleConfig {
    /// Current wall-clock time in the schedule's timezone
    pub fn local_now(&self) -> NaiveDateTime {
        if !self.timezone.eq_ignore_ascii_case("local") {
            match self.timezone.parse::<chrono_tz::Tz>() {
                Ok(tz) => return Utc::now().with_timezone(&tz).naive_local(),
                Err(_) => warn!(
                    "Unknown schedule timezone '{}', using the local timezone",
                    self.timezone
                ),
            }
        }
        Local::now().naive_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ScheduleException, SeasonalRule};
    use chrono::NaiveDate;

    fn at(date: (i32, u32, u32), hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(date.0, date.1, date.2)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn time(s: &str) -> ClockTime {
        s.parse().unwrap()
    }

    fn enabled() -> ScheduleConfig {
        ScheduleConfig {
            enabled: true,
            ..ScheduleConfig::default()
        }
    }

    // 2024-06-05 is a Wednesday, 2024-06-08 a Saturday
    const WEDNESDAY: (i32, u32, u32) = (2024, 6, 5);
    const SATURDAY: (i32, u32, u32) = (2024, 6, 8);

    #[test]
    fn test_disabled_schedule_is_always_active() {
        let mut config = ScheduleConfig::default();
        config.days.clear();
        assert!(should_capture_be_active(&config, at(SATURDAY, 3, 0)));
    }

    #[test]
    fn test_weekly_window_bounds_are_inclusive() {
        let config = enabled();
        assert!(should_capture_be_active(&config, at(WEDNESDAY, 8, 0)));
        assert!(should_capture_be_active(&config, at(WEDNESDAY, 18, 0)));
        assert!(!should_capture_be_active(&config, at(WEDNESDAY, 18, 1)));
        assert!(!should_capture_be_active(&config, at(WEDNESDAY, 7, 59)));
        assert!(!should_capture_be_active(&config, at(SATURDAY, 12, 0)));
    }

    #[test]
    fn test_skip_exception_wins_over_everything() {
        let mut config = enabled();
        config.exceptions.push(ScheduleException {
            date: NaiveDate::from_ymd_opt(2024, 6, 5),
            date_range: None,
            action: ExceptionAction::Skip,
        });
        assert!(!should_capture_be_active(&config, at(WEDNESDAY, 12, 0)));

        config.exceptions[0] = ScheduleException {
            date: None,
            date_range: Some((
                NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 6, 5).unwrap(),
            )),
            action: ExceptionAction::Skip,
        };
        assert!(!should_capture_be_active(&config, at(WEDNESDAY, 12, 0)));
    }

    #[test]
    fn test_normal_exception_falls_through() {
        let mut config = enabled();
        config.exceptions.push(ScheduleException {
            date: NaiveDate::from_ymd_opt(2024, 6, 8),
            date_range: None,
            action: ExceptionAction::Normal,
        });
        config.exceptions.push(ScheduleException {
            date: NaiveDate::from_ymd_opt(2024, 6, 5),
            date_range: None,
            action: ExceptionAction::Normal,
        });
        // Saturday is still outside the weekly days
        assert!(!should_capture_be_active(&config, at(SATURDAY, 12, 0)));
        assert!(should_capture_be_active(&config, at(WEDNESDAY, 12, 0)));
        assert!(!should_capture_be_active(&config, at(WEDNESDAY, 20, 0)));
    }

    #[test]
    fn test_seasonal_rule_wraps_past_midnight() {
        let mut config = enabled();
        config.days = (0..=6).collect();
        config.seasonal_rules.push(SeasonalRule {
            months: (1..=12).collect(),
            start_time: time("22:00"),
            end_time: time("03:00"),
        });

        assert!(should_capture_be_active(&config, at(WEDNESDAY, 23, 0)));
        assert!(should_capture_be_active(&config, at(WEDNESDAY, 2, 0)));
        assert!(!should_capture_be_active(&config, at(WEDNESDAY, 12, 0)));
    }

    #[test]
    fn test_seasonal_rule_decides_without_falling_through() {
        let mut config = enabled();
        config.advanced_mode = true;
        config.cron_patterns.push("0 * * * *".to_string());
        config.seasonal_rules.push(SeasonalRule {
            months: vec![6],
            start_time: time("10:00"),
            end_time: time("11:00"),
        });
        assert!(!should_capture_be_active(&config, at(WEDNESDAY, 12, 0)));
        assert!(should_capture_be_active(&config, at(WEDNESDAY, 10, 30)));
        // Seasonal windows still honour the weekly days
        assert!(!should_capture_be_active(&config, at(SATURDAY, 10, 30)));
    }

    #[test]
    fn test_cron_match_activates_and_miss_falls_through() {
        let mut config = enabled();
        config.advanced_mode = true;
        config.cron_patterns = vec!["invalid".to_string(), "0 20-23 * * *".to_string()];

        assert!(should_capture_be_active(&config, at(SATURDAY, 21, 0)));
        // No cron match: weekly window applies
        assert!(should_capture_be_active(&config, at(WEDNESDAY, 12, 0)));
        assert!(!should_capture_be_active(&config, at(WEDNESDAY, 19, 0)));
    }

    #[test]
    fn test_cron_patterns_ignored_outside_advanced_mode() {
        let mut config = enabled();
        config.cron_patterns = vec!["0 * * * *".to_string()];
        assert!(!should_capture_be_active(&config, at(SATURDAY, 21, 0)));
    }

    #[test]
    fn test_unknown_timezone_falls_back_to_local() {
        let mut config = enabled();
        config.timezone = "Mars/Olympus_Mons".to_string();
        let now = config.local_now();
        let local = Local::now().naive_local();
        assert!((local - now).num_seconds().abs() < 5);

        config.timezone = "Europe/Berlin".to_string();
        let _ = config.local_now();
    }
}
