// Trigger model and its mapping to/from engine triggers

use crate::errors::{ScheduleError, ValidationError};
use crate::scheduler::engine::{CronTrigger, EngineTrigger, SimpleTrigger};
use crate::schedule::parse_cron_expression;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// A firing condition of a job. Exactly one of a cron schedule, a fixed
/// instant, or "as soon as registered".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "TriggerDocument", into = "TriggerDocument")]
pub enum Trigger {
    Cron(String),
    FixedTime(DateTime<Utc>),
    Immediate,
}

impl Trigger {
    /// Build a cron trigger, rejecting expressions that do not parse
    pub fn cron(expression: impl Into<String>) -> Result<Self, ScheduleError> {
        let expression = expression.into();
        parse_cron_expression(&expression)?;
        Ok(Trigger::Cron(expression))
    }

    pub fn fixed_time(when: DateTime<Utc>) -> Self {
        Trigger::FixedTime(when)
    }
}

/// Wire form of a trigger: `{"cron": ..}`, `{"when": ..}` or `{"immediate": true}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immediate: Option<bool>,
}

/// True iff exactly one of cron, when and immediate is set
pub fn validate(trigger: &TriggerDocument) -> bool {
    let populated = [
        trigger.cron.is_some(),
        trigger.when.is_some(),
        trigger.immediate == Some(true),
    ];
    populated.iter().filter(|set| **set).count() == 1
}

impl TryFrom<TriggerDocument> for Trigger {
    type Error = ValidationError;

    fn try_from(doc: TriggerDocument) -> Result<Self, Self::Error> {
        if !validate(&doc) {
            return Err(ValidationError::InvalidTrigger(
                "exactly one of 'cron', 'when' or 'immediate' should be specified".to_string(),
            ));
        }
        match doc {
            TriggerDocument {
                cron: Some(expression),
                ..
            } => Trigger::cron(expression)
                .map_err(|e| ValidationError::InvalidTrigger(e.to_string())),
            TriggerDocument {
                when: Some(when), ..
            } => Ok(Trigger::FixedTime(when)),
            _ => Ok(Trigger::Immediate),
        }
    }
}

impl From<Trigger> for TriggerDocument {
    fn from(trigger: Trigger) -> Self {
        match trigger {
            Trigger::Cron(expression) => TriggerDocument {
                cron: Some(expression),
                ..Default::default()
            },
            Trigger::FixedTime(when) => TriggerDocument {
                when: Some(when),
                ..Default::default()
            },
            Trigger::Immediate => TriggerDocument {
                immediate: Some(true),
                ..Default::default()
            },
        }
    }
}

/// Build the engine trigger for `trigger` as of `now`.
///
/// Cron expressions are evaluated in `timezone`.
pub fn to_engine_trigger(
    trigger: &Trigger,
    now: DateTime<Utc>,
    timezone: Tz,
) -> Result<EngineTrigger, ScheduleError> {
    match trigger {
        Trigger::Cron(expression) => Ok(EngineTrigger::Cron(CronTrigger::new(
            expression, timezone, now,
        )?)),
        Trigger::FixedTime(when) => Ok(EngineTrigger::Simple(SimpleTrigger::once_at(*when))),
        Trigger::Immediate => Ok(EngineTrigger::Simple(SimpleTrigger::once_at(now))),
    }
}

/// Rebuild a trigger from its engine form.
///
/// The engine does not tell "immediate" apart from "fixed time": a one-shot
/// trigger with no repeats and no next fire time reads back as `Immediate`,
/// any other one-shot as `FixedTime` at its start time. An immediate trigger
/// that has not fired yet therefore reads back as `FixedTime`, and a fixed
/// time trigger that already fired reads back as `Immediate`.
pub fn from_engine_trigger(trigger: &EngineTrigger) -> Trigger {
    match trigger {
        EngineTrigger::Cron(cron) => Trigger::Cron(cron.expression().to_string()),
        EngineTrigger::Simple(simple)
            if simple.repeat_count == 0 && simple.next_fire_time.is_none() =>
        {
            Trigger::Immediate
        }
        EngineTrigger::Simple(simple) => Trigger::FixedTime(simple.start_time),
    }
}
