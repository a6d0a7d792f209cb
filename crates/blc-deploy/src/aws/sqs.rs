//! AWS SQS queues.
use snafu::prelude::*;

use crate::{remote::Outputs, synth::Synth, ConfigError, Descriptor, HasDependencies, InvalidSnafu};

pub const MIN_RETENTION_SECONDS: u32 = 60;
pub const MAX_RETENTION_SECONDS: u32 = 14 * 24 * 60 * 60;
pub const MAX_VISIBILITY_TIMEOUT_SECONDS: u32 = 12 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Queue {
    pub queue_name: String,
    pub visibility_timeout_seconds: u32,
    pub retention_period_seconds: u32,
}

impl HasDependencies for Queue {}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QueueOutput {
    pub arn: String,
    pub url: String,
}

impl Descriptor for Queue {
    const KIND: &'static str = "queue";

    type Provider = Synth;
    type Error = crate::Error;
    type Output = QueueOutput;

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        ensure!(
            !self.queue_name.is_empty(),
            InvalidSnafu {
                name,
                reason: "queue name is empty"
            }
        );
        ensure!(
            (MIN_RETENTION_SECONDS..=MAX_RETENTION_SECONDS).contains(&self.retention_period_seconds),
            InvalidSnafu {
                name,
                reason: format!(
                    "retention period {}s is outside {MIN_RETENTION_SECONDS}..={MAX_RETENTION_SECONDS}",
                    self.retention_period_seconds
                )
            }
        );
        ensure!(
            self.visibility_timeout_seconds <= MAX_VISIBILITY_TIMEOUT_SECONDS,
            InvalidSnafu {
                name,
                reason: format!(
                    "visibility timeout {}s exceeds {MAX_VISIBILITY_TIMEOUT_SECONDS}",
                    self.visibility_timeout_seconds
                )
            }
        );
        Ok(())
    }

    async fn provision(&self, provider: &Synth, _outputs: &Outputs) -> Result<QueueOutput, crate::Error> {
        Ok(QueueOutput {
            arn: provider.arn("sqs", &self.queue_name),
            url: format!(
                "https://sqs.{}.amazonaws.com/{}/{}",
                provider.region, provider.account, self.queue_name
            ),
        })
    }
}
