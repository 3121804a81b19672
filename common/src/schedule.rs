// Cron parsing and next fire time calculation
//
// Cron expressions follow the Quartz layout with second precision:
// `sec min hour day-of-month month day-of-week [year]`, `?` allowed.

use crate::errors::ScheduleError;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use std::str::FromStr;

/// Parse and validate a cron expression
pub fn parse_cron_expression(expression: &str) -> Result<CronSchedule, ScheduleError> {
    CronSchedule::from_str(expression.trim()).map_err(|e| ScheduleError::InvalidCronExpression {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

/// Next fire time strictly after `after`, evaluated in `timezone` and returned in UTC.
///
/// Returns `None` when the expression has no future occurrence (e.g. a past year).
pub fn next_cron_fire(
    schedule: &CronSchedule,
    after: DateTime<Utc>,
    timezone: Tz,
) -> Option<DateTime<Utc>> {
    let after_in_tz = after.with_timezone(&timezone);
    schedule
        .after(&after_in_tz)
        .next()
        .map(|next| next.with_timezone(&Utc))
}

/// Parse an IANA timezone name such as `Europe/Madrid`
pub fn parse_timezone(name: &str) -> Result<Tz, ScheduleError> {
    Tz::from_str(name).map_err(|_| ScheduleError::InvalidTimezone(name.to_string()))
}

/// Timezone used to evaluate cron expressions when none is configured
pub fn default_timezone() -> Tz {
    chrono_tz::UTC
}
