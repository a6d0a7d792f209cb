//! Schedule rules and queue subscriptions.
use super::functions::{self, FunctionSet};
use crate::{
    aws::{
        events::{ScheduleExpression, Trigger, TriggerKind},
        sqs::Queue,
    },
    config::EnvironmentContext,
    remote::{qualified_id, Ref},
    ConfigError, Descriptor,
};

pub const INGEST_BATCH_SIZE: u32 = 10;

/// A named schedule and the functions it invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSpec {
    pub name: &'static str,
    pub expression: &'static str,
    pub targets: &'static [&'static str],
}

/// Times are UTC.
pub const SCHEDULES: &[ScheduleSpec] = &[
    ScheduleSpec {
        name: "every-15-minutes",
        expression: "rate(15 minutes)",
        targets: &[functions::FETCH_DATA],
    },
    // 7am EST
    ScheduleSpec {
        name: "morning",
        expression: "cron(0 12 * * ? *)",
        targets: &[functions::FETCH_DATA],
    },
    // 12pm EST
    ScheduleSpec {
        name: "noon",
        expression: "cron(0 17 * * ? *)",
        targets: &[functions::FETCH_DATA],
    },
    // 4:10pm EST, after the close
    ScheduleSpec {
        name: "afternoon",
        expression: "cron(10 21 * * ? *)",
        targets: &[functions::FETCH_DATA, functions::FETCH_STRATEGY_KPIS],
    },
];

/// A queue and the functions subscribed to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionSpec {
    pub name: &'static str,
    pub targets: &'static [&'static str],
}

pub const SUBSCRIPTIONS: &[SubscriptionSpec] = &[SubscriptionSpec {
    name: "ingest-queue",
    targets: &[functions::INGEST_TRANSACTIONS],
}];

/// Resolves the triggers of the application.
///
/// `queue` is the logical name and descriptor of the ingest queue.
pub fn resolve_triggers(
    ctx: &EnvironmentContext,
    functions: &FunctionSet,
    queue: (&str, &Queue),
) -> Result<Vec<(String, Trigger)>, ConfigError> {
    resolve_triggers_from(ctx, functions, queue, SCHEDULES, SUBSCRIPTIONS)
}

/// Resolves the given schedules and queue subscriptions.
///
/// Each schedule becomes a single rule that fans out to all of its targets.
///
/// ## Errors
/// Errs if a trigger targets an unknown function, if an expression does not
/// parse, if a subscribed function may not consume the queue, or if the
/// queue's visibility timeout is shorter than the timeout of a subscribed
/// function.
pub fn resolve_triggers_from(
    ctx: &EnvironmentContext,
    functions: &FunctionSet,
    (queue_name, queue): (&str, &Queue),
    schedules: &[ScheduleSpec],
    subscriptions: &[SubscriptionSpec],
) -> Result<Vec<(String, Trigger)>, ConfigError> {
    let mut triggers = vec![];

    for spec in schedules.iter() {
        let from = qualified_id(Trigger::KIND, spec.name);
        let expression: ScheduleExpression =
            spec.expression
                .parse()
                .map_err(|reason| ConfigError::Invalid {
                    name: from.clone(),
                    reason,
                })?;
        let targets = spec
            .targets
            .iter()
            .map(|target| functions.reference(&from, target))
            .collect::<Result<Vec<_>, _>>()?;
        triggers.push((
            spec.name.to_owned(),
            Trigger {
                kind: TriggerKind::Schedule {
                    rule_name: ctx.resource_name(&format!("FetchDataRule-{}", spec.name)),
                    expression,
                },
                targets,
                enabled: true,
            },
        ));
    }

    for spec in subscriptions.iter() {
        let from = qualified_id(Trigger::KIND, spec.name);
        let mut targets = vec![];
        for target in spec.targets.iter() {
            let reference = functions.reference(&from, target)?;
            let (timeout, consumes) = functions
                .get(target)
                .map(|function| (function.timeout_seconds, function.consumes(queue_name)))
                .unwrap_or_default();
            if !consumes {
                return Err(ConfigError::Invalid {
                    name: from,
                    reason: format!("'{target}' has no grant to consume queue '{queue_name}'"),
                });
            }
            if queue.visibility_timeout_seconds < timeout {
                return Err(ConfigError::Invalid {
                    name: from,
                    reason: format!(
                        "visibility timeout of queue '{queue_name}' ({}s) is shorter than \
                         the timeout of '{target}' ({timeout}s)",
                        queue.visibility_timeout_seconds
                    ),
                });
            }
            targets.push(reference);
        }
        triggers.push((
            spec.name.to_owned(),
            Trigger {
                kind: TriggerKind::Queue {
                    queue: Ref::new(queue_name),
                    batch_size: INGEST_BATCH_SIZE,
                },
                targets,
                enabled: true,
            },
        ));
    }

    Ok(triggers)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        config::EnvType,
        stack::{
            functions::{resolve_functions, resolve_queue},
            tables::resolve_tables,
        },
    };
    use pretty_assertions::assert_eq;

    fn setup() -> (EnvironmentContext, FunctionSet, Queue) {
        let ctx = EnvironmentContext::builder("dev", EnvType::Dev)
            .account("111")
            .region("us-east-1")
            .credential("x")
            .build()
            .unwrap();
        let functions = resolve_functions(&ctx, &resolve_tables(&ctx), &Ref::new("common")).unwrap();
        let queue = resolve_queue(&ctx);
        (ctx, functions, queue)
    }

    #[test]
    fn afternoon_fans_out_without_repeating_the_schedule() {
        let (ctx, functions, queue) = setup();
        let triggers = resolve_triggers(&ctx, &functions, ("ingest", &queue)).unwrap();
        let names = triggers.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>();
        assert_eq!(
            vec!["every-15-minutes", "morning", "noon", "afternoon", "ingest-queue"],
            names
        );

        let afternoon = triggers
            .iter()
            .filter(|(_, trigger)| match &trigger.kind {
                TriggerKind::Schedule { expression, .. } => {
                    expression.to_string() == "cron(10 21 * * ? *)"
                }
                _ => false,
            })
            .collect::<Vec<_>>();
        assert_eq!(1, afternoon.len());
        assert_eq!(
            vec![
                Ref::new(functions::FETCH_DATA),
                Ref::new(functions::FETCH_STRATEGY_KPIS)
            ],
            afternoon[0].1.targets
        );
    }

    #[test]
    fn unknown_targets_are_dangling() {
        let (ctx, functions, queue) = setup();
        let schedules = [ScheduleSpec {
            name: "nightly",
            expression: "cron(0 3 * * ? *)",
            targets: &["fetch-symbol-div-info"],
        }];
        assert_eq!(
            Err(ConfigError::DanglingReference {
                from: "trigger/nightly".to_owned(),
                to: "function/fetch-symbol-div-info".to_owned(),
            }),
            resolve_triggers_from(&ctx, &functions, ("ingest", &queue), &schedules, &[])
        );
    }

    #[test]
    fn bad_expressions_are_invalid() {
        let (ctx, functions, queue) = setup();
        let schedules = [ScheduleSpec {
            name: "often",
            expression: "rate(0 minutes)",
            targets: &[functions::FETCH_DATA],
        }];
        assert!(matches!(
            resolve_triggers_from(&ctx, &functions, ("ingest", &queue), &schedules, &[]),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn subscribers_need_a_queue_grant() {
        let (ctx, functions, queue) = setup();
        let subscriptions = [SubscriptionSpec {
            name: "kpi-queue",
            targets: &[functions::FETCH_STRATEGY_KPIS],
        }];
        assert!(matches!(
            resolve_triggers_from(&ctx, &functions, ("ingest", &queue), &[], &subscriptions),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(resolve_triggers(&ctx, &functions, ("ingest", &queue)).is_ok());
    }

    #[test]
    fn visibility_timeout_covers_subscribers() {
        let (ctx, functions, mut queue) = setup();
        queue.visibility_timeout_seconds = 10;
        assert!(matches!(
            resolve_triggers(&ctx, &functions, ("ingest", &queue)),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
