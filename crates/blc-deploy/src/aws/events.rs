//! Triggers: EventBridge schedule rules and SQS subscriptions.
use snafu::prelude::*;

use super::{lambda::Function, sqs::Queue};
use crate::{
    remote::{Outputs, Ref},
    synth::Synth,
    ConfigError, Dependencies, Descriptor, HasDependencies, InvalidSnafu,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RateUnit {
    Minutes,
    Hours,
    Days,
}

impl RateUnit {
    fn name(&self, value: u32) -> &'static str {
        match (self, value) {
            (RateUnit::Minutes, 1) => "minute",
            (RateUnit::Minutes, _) => "minutes",
            (RateUnit::Hours, 1) => "hour",
            (RateUnit::Hours, _) => "hours",
            (RateUnit::Days, 1) => "day",
            (RateUnit::Days, _) => "days",
        }
    }
}

/// The six fields of an EventBridge cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cron {
    pub minute: String,
    pub hour: String,
    pub day_of_month: String,
    pub month: String,
    pub day_of_week: String,
    pub year: String,
}

impl Cron {
    /// A daily rule at the given UTC time.
    pub fn daily(hour: u32, minute: u32) -> Self {
        Cron {
            minute: minute.to_string(),
            hour: hour.to_string(),
            day_of_month: "*".to_owned(),
            month: "*".to_owned(),
            day_of_week: "?".to_owned(),
            year: "*".to_owned(),
        }
    }
}

/// A schedule, either `rate(...)` or `cron(...)`.
///
/// Serializes as its EventBridge string form.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ScheduleExpression {
    Rate { value: u32, unit: RateUnit },
    Cron(Cron),
}

impl ScheduleExpression {
    pub fn minutes(value: u32) -> Self {
        ScheduleExpression::Rate {
            value,
            unit: RateUnit::Minutes,
        }
    }
}

impl core::fmt::Display for ScheduleExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleExpression::Rate { value, unit } => {
                write!(f, "rate({value} {})", unit.name(*value))
            }
            ScheduleExpression::Cron(Cron {
                minute,
                hour,
                day_of_month,
                month,
                day_of_week,
                year,
            }) => write!(
                f,
                "cron({minute} {hour} {day_of_month} {month} {day_of_week} {year})"
            ),
        }
    }
}

fn parse_rate(body: &str) -> Result<ScheduleExpression, String> {
    let mut parts = body.split_whitespace();
    let (Some(value), Some(unit_name), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format!("'rate({body})' must be 'rate(<value> <unit>)'"));
    };
    let value: u32 = value
        .parse()
        .map_err(|e| format!("rate value '{value}': {e}"))?;
    if value == 0 {
        return Err("rate value must be positive".to_owned());
    }
    let unit = match unit_name {
        "minute" | "minutes" => RateUnit::Minutes,
        "hour" | "hours" => RateUnit::Hours,
        "day" | "days" => RateUnit::Days,
        other => return Err(format!("unknown rate unit '{other}'")),
    };
    if unit.name(value) != unit_name {
        return Err(format!(
            "rate unit must be '{}' for a value of {value}",
            unit.name(value)
        ));
    }
    Ok(ScheduleExpression::Rate { value, unit })
}

const MONTHS: &[&str] = &[
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const WEEKDAYS: &[&str] = &["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Extra syntax a cron field accepts besides values, ranges, lists and steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CronSyntax {
    Plain,
    /// `?`, `L`, `LW` and `{day}W`.
    DayOfMonth,
    /// `?`, `L`, `{day}L` and `{day}#{nth}`.
    DayOfWeek,
}

struct CronField {
    label: &'static str,
    min: u32,
    max: u32,
    /// Names of the values, the first one being `min`.
    names: &'static [&'static str],
    syntax: CronSyntax,
}

const MINUTE: CronField = CronField {
    label: "minute",
    min: 0,
    max: 59,
    names: &[],
    syntax: CronSyntax::Plain,
};
const HOUR: CronField = CronField {
    label: "hour",
    min: 0,
    max: 23,
    names: &[],
    syntax: CronSyntax::Plain,
};
const DAY_OF_MONTH: CronField = CronField {
    label: "day-of-month",
    min: 1,
    max: 31,
    names: &[],
    syntax: CronSyntax::DayOfMonth,
};
const MONTH: CronField = CronField {
    label: "month",
    min: 1,
    max: 12,
    names: MONTHS,
    syntax: CronSyntax::Plain,
};
const DAY_OF_WEEK: CronField = CronField {
    label: "day-of-week",
    min: 1,
    max: 7,
    names: WEEKDAYS,
    syntax: CronSyntax::DayOfWeek,
};
const YEAR: CronField = CronField {
    label: "year",
    min: 1970,
    max: 2199,
    names: &[],
    syntax: CronSyntax::Plain,
};

impl CronField {
    fn value(&self, s: &str) -> Result<u32, String> {
        let value = match s.parse::<u32>() {
            Ok(value) => value,
            Err(_) => self
                .names
                .iter()
                .position(|name| name.eq_ignore_ascii_case(s))
                .map(|i| self.min + i as u32)
                .ok_or_else(|| format!("'{s}' is not a valid cron {}", self.label))?,
        };
        if (self.min..=self.max).contains(&value) {
            Ok(value)
        } else {
            Err(format!(
                "cron {} {value} is outside {}..={}",
                self.label, self.min, self.max
            ))
        }
    }

    fn check_range(&self, s: &str) -> Result<(), String> {
        if s == "*" {
            return Ok(());
        }
        match s.split_once('-') {
            Some((start, end)) => {
                self.value(start)?;
                self.value(end)?;
            }
            None => {
                self.value(s)?;
            }
        }
        Ok(())
    }

    fn check_item(&self, item: &str) -> Result<(), String> {
        match self.syntax {
            CronSyntax::DayOfMonth => {
                if item == "L" || item == "LW" {
                    return Ok(());
                }
                if let Some(day) = item.strip_suffix('W') {
                    return self.value(day).map(drop);
                }
            }
            CronSyntax::DayOfWeek => {
                if item == "L" {
                    return Ok(());
                }
                if let Some(day) = item.strip_suffix('L') {
                    return self.value(day).map(drop);
                }
                if let Some((day, nth)) = item.split_once('#') {
                    self.value(day)?;
                    return match nth.parse::<u32>() {
                        Ok(1..=5) => Ok(()),
                        _ => Err(format!("'{item}' must name the 1st to 5th weekday")),
                    };
                }
            }
            CronSyntax::Plain => {}
        }

        match item.split_once('/') {
            Some((start, step)) => {
                self.check_range(start)?;
                match step.parse::<u32>() {
                    Ok(step) if (1..=self.max).contains(&step) => Ok(()),
                    _ => Err(format!("invalid cron {} step '{step}'", self.label)),
                }
            }
            None => self.check_range(item),
        }
    }

    fn check(&self, field: &str) -> Result<(), String> {
        if field == "?" {
            return if self.syntax == CronSyntax::Plain {
                Err(format!("cron {} field can't be '?'", self.label))
            } else {
                Ok(())
            };
        }
        field.split(',').try_for_each(|item| self.check_item(item))
    }
}

fn parse_cron(body: &str) -> Result<ScheduleExpression, String> {
    let fields = body.split_whitespace().collect::<Vec<_>>();
    let [minute, hour, day_of_month, month, day_of_week, year] = fields.as_slice() else {
        return Err(format!(
            "cron expressions have 6 fields, 'cron({body})' has {}",
            fields.len()
        ));
    };
    MINUTE.check(minute)?;
    HOUR.check(hour)?;
    DAY_OF_MONTH.check(day_of_month)?;
    MONTH.check(month)?;
    DAY_OF_WEEK.check(day_of_week)?;
    YEAR.check(year)?;
    if (*day_of_month == "?") == (*day_of_week == "?") {
        return Err("exactly one of day-of-month and day-of-week must be '?'".to_owned());
    }
    Ok(ScheduleExpression::Cron(Cron {
        minute: minute.to_string(),
        hour: hour.to_string(),
        day_of_month: day_of_month.to_string(),
        month: month.to_string(),
        day_of_week: day_of_week.to_string(),
        year: year.to_string(),
    }))
}

impl std::str::FromStr for ScheduleExpression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(body) = s.strip_prefix("rate(").and_then(|s| s.strip_suffix(')')) {
            parse_rate(body)
        } else if let Some(body) = s.strip_prefix("cron(").and_then(|s| s.strip_suffix(')')) {
            parse_cron(body)
        } else {
            Err(format!("'{s}' is neither rate(...) nor cron(...)"))
        }
    }
}

impl TryFrom<String> for ScheduleExpression {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ScheduleExpression> for String {
    fn from(value: ScheduleExpression) -> Self {
        value.to_string()
    }
}

/// What fires a trigger.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerKind {
    Schedule {
        rule_name: String,
        expression: ScheduleExpression,
    },
    Queue {
        queue: Ref<Queue>,
        batch_size: u32,
    },
}

impl HasDependencies for TriggerKind {
    fn dependencies(&self) -> Dependencies {
        match self {
            TriggerKind::Schedule { .. } => Dependencies::default(),
            TriggerKind::Queue { queue, .. } => queue.dependencies(),
        }
    }
}

/// Binds a schedule or a queue to one or more functions.
///
/// A single schedule rule may fan out to several functions.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, HasDependencies)]
pub struct Trigger {
    pub kind: TriggerKind,
    pub targets: Vec<Ref<Function>>,
    #[dependencies(skip)]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TriggerOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_arn: Option<String>,
    pub target_arns: Vec<String>,
}

impl Descriptor for Trigger {
    const KIND: &'static str = "trigger";

    type Provider = Synth;
    type Error = crate::Error;
    type Output = TriggerOutput;

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        ensure!(
            !self.targets.is_empty(),
            InvalidSnafu {
                name,
                reason: "a trigger needs at least one target"
            }
        );
        for (i, target) in self.targets.iter().enumerate() {
            ensure!(
                !self.targets[..i].contains(target),
                InvalidSnafu {
                    name,
                    reason: format!("function '{}' is targeted twice", target.name())
                }
            );
        }
        if let TriggerKind::Schedule { expression, .. } = &self.kind {
            // The variants are public, so the expression may not have been parsed
            expression
                .to_string()
                .parse::<ScheduleExpression>()
                .map_err(|reason| ConfigError::Invalid {
                    name: name.to_owned(),
                    reason,
                })?;
        }
        if let TriggerKind::Queue { batch_size, .. } = &self.kind {
            ensure!(
                (1..=10_000).contains(batch_size),
                InvalidSnafu {
                    name,
                    reason: format!("batch size {batch_size} is outside 1..=10000")
                }
            );
        }
        Ok(())
    }

    async fn provision(&self, provider: &Synth, outputs: &Outputs) -> Result<TriggerOutput, crate::Error> {
        let target_arns = self
            .targets
            .iter()
            .map(|target| target.get(outputs).map(|function| function.arn))
            .collect::<Result<Vec<_>, _>>()?;
        let rule_arn = match &self.kind {
            TriggerKind::Schedule {
                rule_name,
                expression,
            } => {
                log::debug!("  rule {rule_name} runs on {expression}");
                Some(provider.arn("events", &format!("rule/{rule_name}")))
            }
            TriggerKind::Queue { queue, .. } => {
                let queue = queue.get(outputs)?;
                log::debug!("  subscribing to {}", queue.arn);
                None
            }
        };
        Ok(TriggerOutput {
            rule_arn,
            target_arns,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_rates() {
        assert_eq!(
            ScheduleExpression::minutes(15),
            "rate(15 minutes)".parse().unwrap()
        );
        assert_eq!(
            ScheduleExpression::minutes(1),
            "rate(1 minute)".parse().unwrap()
        );
        assert!("rate(1 minutes)".parse::<ScheduleExpression>().is_err());
        assert!("rate(0 minutes)".parse::<ScheduleExpression>().is_err());
        assert!("rate(5 weeks)".parse::<ScheduleExpression>().is_err());
        assert!("rate(minutes)".parse::<ScheduleExpression>().is_err());
    }

    #[test]
    fn parse_crons() {
        let expression: ScheduleExpression = "cron(10 21 * * ? *)".parse().unwrap();
        assert_eq!(ScheduleExpression::Cron(Cron::daily(21, 10)), expression);
        assert_eq!("cron(10 21 * * ? *)", expression.to_string());

        assert!("cron(0 12 * * *)".parse::<ScheduleExpression>().is_err());
        assert!("cron(0 12 * * * *)".parse::<ScheduleExpression>().is_err());
        assert!("cron(0 12 ? * ? *)".parse::<ScheduleExpression>().is_err());
        assert!("cron(0 12 * * MON-FRI *)".parse::<ScheduleExpression>().is_err());
        assert!("cron(0 12 ? * MON-FRI *)".parse::<ScheduleExpression>().is_ok());
        assert!("every day".parse::<ScheduleExpression>().is_err());
    }

    #[test]
    fn cron_values_are_range_checked() {
        for expression in [
            "cron(99 25 * * ? *)",
            "cron(60 12 * * ? *)",
            "cron(0 24 * * ? *)",
            "cron(0 12 0 * ? *)",
            "cron(0 12 32 * ? *)",
            "cron(0 12 * 13 ? *)",
            "cron(0 12 * JUNE ? *)",
            "cron(0 12 ? * 8 *)",
            "cron(0 12 ? * MON-FUN *)",
            "cron(0 12 * * ? 1969)",
            "cron(0 12 * * ? 2200)",
            "cron(0-60 12 * * ? *)",
            "cron(0,61 12 * * ? *)",
            "cron(0/0 12 * * ? *)",
            "cron(0/61 12 * * ? *)",
            "cron(0 12 ? * 2#6 *)",
            "cron(0 12 32W * ? *)",
            "cron(0 12 * * ? ?)",
            "cron(0 12 1,,2 * ? *)",
        ] {
            assert!(
                expression.parse::<ScheduleExpression>().is_err(),
                "{expression}"
            );
        }
        for expression in [
            "cron(0/15 8-17 * * ? *)",
            "cron(0 12 L * ? *)",
            "cron(0 12 15W JAN-MAR ? 2030)",
            "cron(0 12 ? * 6L *)",
            "cron(0 12 ? * MON#2 *)",
            "cron(0,30 0 1 jan ? 1970-2199)",
        ] {
            assert!(
                expression.parse::<ScheduleExpression>().is_ok(),
                "{expression}"
            );
        }
    }

    #[test]
    fn unparsed_expressions_are_validated() {
        let trigger = |expression| Trigger {
            kind: TriggerKind::Schedule {
                rule_name: "dev-FetchDataRule-often".to_owned(),
                expression,
            },
            targets: vec![Ref::new("fetch-data")],
            enabled: true,
        };
        assert!(matches!(
            trigger(ScheduleExpression::minutes(0)).validate("often"),
            Err(ConfigError::Invalid { .. })
        ));
        let mut cron = Cron::daily(12, 0);
        cron.day_of_month = "?".to_owned();
        assert!(trigger(ScheduleExpression::Cron(cron)).validate("often").is_err());
        assert!(trigger(ScheduleExpression::Cron(Cron::daily(25, 0)))
            .validate("often")
            .is_err());
        assert!(trigger(ScheduleExpression::minutes(15)).validate("often").is_ok());
    }

    #[test]
    fn expressions_serialize_as_strings() {
        let json = serde_json::to_string(&ScheduleExpression::minutes(15)).unwrap();
        assert_eq!("\"rate(15 minutes)\"", json);
        assert!(serde_json::from_str::<ScheduleExpression>("\"rate(15 lightyears)\"").is_err());
    }

    #[test]
    fn fan_out_dependencies() {
        let trigger = Trigger {
            kind: TriggerKind::Schedule {
                rule_name: "dev-FetchDataRule-afternoon".to_owned(),
                expression: ScheduleExpression::Cron(Cron::daily(21, 10)),
            },
            targets: vec![Ref::new("fetch-data"), Ref::new("fetch-strategy-kpis")],
            enabled: true,
        };
        let deps = trigger.dependencies().into_iter().collect::<Vec<_>>();
        assert_eq!(
            vec![
                "function/fetch-data".to_owned(),
                "function/fetch-strategy-kpis".to_owned()
            ],
            deps
        );
        assert!(trigger.validate("afternoon").is_ok());
    }

    #[test]
    fn duplicate_targets_are_invalid() {
        let trigger = Trigger {
            kind: TriggerKind::Queue {
                queue: Ref::new("ingest"),
                batch_size: 10,
            },
            targets: vec![Ref::new("ingest"), Ref::new("ingest")],
            enabled: true,
        };
        assert!(trigger.validate("ingest").is_err());
        assert!(trigger.dependencies().contains("queue/ingest"));
    }
}
