//! Cron pattern validation (delegated to the `cron` crate) and hour-field matching.

use std::str::FromStr;

const HOUR: (u32, u32) = (0, 23);

/// Weekday numbers 0..=7 as names. Only validity is checked, so 7 (Sunday) may map to Saturday.
const WEEKDAYS: [&str; 8] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sat"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HourItem {
    Any,
    Every(u32),
    Value(u32),
    Range { start: u32, end: u32, step: u32 },
}

impl HourItem {
    fn matches(&self, hour: u32) -> bool {
        match *self {
            HourItem::Any => true,
            HourItem::Every(step) => hour % step == 0,
            HourItem::Value(v) => v == hour,
            HourItem::Range { start, end, step } => {
                hour >= start && hour <= end && (hour - start) % step == 0
            }
        }
    }
}

/// Whether `pattern` is a five-field (minute-first) or six-field (second-first)
/// cron expression that parses as a schedule.
pub fn validate_cron_pattern(pattern: &str) -> bool {
    schedule_expression(pattern)
        .map(|expression| cron::Schedule::from_str(&expression).is_ok())
        .unwrap_or(false)
}

/// Whether a valid pattern's hour field selects `hour`. Invalid patterns never match.
pub fn hour_matches(pattern: &str, hour: u32) -> bool {
    if !validate_cron_pattern(pattern) {
        return false;
    }
    let fields: Vec<&str> = pattern.split_whitespace().collect();
    let hour_field = match fields.len() {
        5 => fields[1],
        _ => fields[2],
    };
    parse_hour_field(hour_field)
        .map(|items| items.iter().any(|item| item.matches(hour)))
        .unwrap_or(false)
}

/// Rewrite into the seconds-first form with named weekdays that `cron::Schedule` parses
fn schedule_expression(pattern: &str) -> Option<String> {
    let mut fields: Vec<String> = pattern.split_whitespace().map(str::to_string).collect();
    match fields.len() {
        5 => fields.insert(0, "0".to_string()),
        6 => {}
        _ => return None,
    }
    let zero_step = fields.iter().flat_map(|field| field.split(',')).any(|item| {
        item.split_once('/')
            .map(|(_, step)| step.parse::<u32>() == Ok(0))
            .unwrap_or(false)
    });
    if zero_step {
        return None;
    }

    fields[4] = capitalize_names(&fields[4]);
    fields[5] = weekday_field(&fields[5])?;
    Some(fields.join(" "))
}

fn capitalize_names(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut word_start = true;
    for c in field.chars() {
        if c.is_ascii_alphabetic() {
            out.push(if word_start {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            });
            word_start = false;
        } else {
            out.push(c);
            word_start = true;
        }
    }
    out
}

fn weekday_field(field: &str) -> Option<String> {
    field
        .split(',')
        .map(|item| {
            let (base, step) = match item.split_once('/') {
                Some((base, step)) => (base, Some(step)),
                None => (item, None),
            };
            let base = if base == "*" {
                base.to_string()
            } else {
                base.split('-')
                    .map(weekday_token)
                    .collect::<Option<Vec<_>>>()?
                    .join("-")
            };
            Some(match step {
                Some(step) => format!("{}/{}", base, step),
                None => base,
            })
        })
        .collect::<Option<Vec<_>>>()
        .map(|items| items.join(","))
}

fn weekday_token(token: &str) -> Option<String> {
    match token.parse::<usize>() {
        Ok(day) => WEEKDAYS.get(day).map(|name| name.to_string()),
        Err(_) => Some(capitalize_names(token)),
    }
}

fn parse_hour_field(field: &str) -> Option<Vec<HourItem>> {
    field.split(',').map(parse_hour_item).collect()
}

fn parse_hour_item(item: &str) -> Option<HourItem> {
    let (min, max) = HOUR;
    let (base, step) = match item.split_once('/') {
        Some((base, step)) => (base, Some(step.parse::<u32>().ok().filter(|s| *s > 0)?)),
        None => (item, None),
    };

    if base == "*" {
        return Some(match step {
            Some(step) => HourItem::Every(step),
            None => HourItem::Any,
        });
    }

    let value = |raw: &str| raw.parse::<u32>().ok().filter(|v| (min..=max).contains(v));
    if let Some((start, end)) = base.split_once('-') {
        return Some(HourItem::Range {
            start: value(start)?,
            end: value(end)?,
            step: step.unwrap_or(1),
        });
    }

    let hour = value(base)?;
    Some(match step {
        Some(step) => HourItem::Range {
            start: hour,
            end: max,
            step,
        },
        None => HourItem::Value(hour),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_common_patterns() {
        assert!(validate_cron_pattern("* * * * *"));
        assert!(validate_cron_pattern("0 9-17 * * 1-5"));
        assert!(validate_cron_pattern("*/15 */2 * * *"));
        assert!(validate_cron_pattern("0 0 6,12,18 * * *"));
        assert!(validate_cron_pattern("0 8-20/4 * jan-mar mon"));
        assert!(validate_cron_pattern("30 6 * * 0"));
        assert!(validate_cron_pattern("30 6 * * 7"));
    }

    #[test]
    fn test_validate_rejects_malformed_patterns() {
        assert!(!validate_cron_pattern(""));
        assert!(!validate_cron_pattern("* * * *"));
        assert!(!validate_cron_pattern("* * * * * * *"));
        assert!(!validate_cron_pattern("0 24 * * *"));
        assert!(!validate_cron_pattern("0 */0 * * *"));
        assert!(!validate_cron_pattern("0 nine * * *"));
        assert!(!validate_cron_pattern("0 9 * * 8"));
    }

    #[test]
    fn test_five_field_patterns_gain_a_seconds_field() {
        assert_eq!(
            schedule_expression("30 9 * jan 1-5").as_deref(),
            Some("0 30 9 * Jan Mon-Fri")
        );
        assert_eq!(
            schedule_expression("0 30 9 * * */2").as_deref(),
            Some("0 30 9 * * */2")
        );
    }

    #[test]
    fn test_hour_field_position_depends_on_field_count() {
        // Five fields: minute hour ...
        assert!(hour_matches("30 9 * * *", 9));
        assert!(!hour_matches("9 30 * * *", 9));
        // Six fields: second minute hour ...
        assert!(hour_matches("0 30 9 * * *", 9));
        assert!(!hour_matches("0 9 30 * * *", 9));
    }

    #[test]
    fn test_hour_matching_forms() {
        assert!(hour_matches("0 * * * *", 3));
        assert!(hour_matches("0 */6 * * *", 12));
        assert!(!hour_matches("0 */6 * * *", 13));
        assert!(hour_matches("0 9-17 * * *", 17));
        assert!(!hour_matches("0 9-17 * * *", 18));
        assert!(hour_matches("0 8-20/4 * * *", 16));
        assert!(!hour_matches("0 8-20/4 * * *", 14));
        assert!(hour_matches("0 6,18 * * *", 18));
        assert!(!hour_matches("garbage", 18));
    }
}
