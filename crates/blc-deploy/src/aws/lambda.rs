//! AWS Lambda functions and layers.
use std::collections::BTreeMap;

use snafu::prelude::*;

use super::{
    dynamodb::Table,
    iam::{self, PolicyStatement, TableAccess},
    sqs::Queue,
};
use crate::{
    remote::{Outputs, Ref},
    synth::Synth,
    ConfigError, Dependencies, Descriptor, HasDependencies, InvalidSnafu,
};

pub const MIN_MEMORY_MB: u32 = 128;
pub const MAX_MEMORY_MB: u32 = 10_240;
pub const MAX_TIMEOUT_SECONDS: u32 = 900;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Runtime {
    #[serde(rename = "python3.12")]
    Python312,
}

impl Runtime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Runtime::Python312 => "python3.12",
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    #[default]
    Arm64,
    X86_64,
}

/// Where a function's handler lives.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EntryPoint {
    /// Directory that is bundled as the function's code.
    pub entry: String,
    /// File within `entry` that defines the handler.
    pub index: String,
    pub handler: String,
}

impl EntryPoint {
    pub fn new(entry: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            index: index.into(),
            handler: "handler".to_owned(),
        }
    }

    /// The handler as the runtime expects it, eg `api.handler`.
    pub fn qualified_handler(&self) -> String {
        let module = self.index.trim_end_matches(".py").replace('/', ".");
        format!("{module}.{}", self.handler)
    }
}

/// A shared dependency layer built from a requirements manifest.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Layer {
    pub layer_name: String,
    pub entry: String,
    pub requirements: String,
    pub compatible_runtimes: Vec<Runtime>,
    pub description: String,
    /// Digest of the requirements manifest, if it could be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl HasDependencies for Layer {}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LayerOutput {
    pub layer_arn: String,
    pub layer_version_arn: String,
}

impl Descriptor for Layer {
    const KIND: &'static str = "layer";

    type Provider = Synth;
    type Error = crate::Error;
    type Output = LayerOutput;

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        ensure!(
            !self.layer_name.is_empty(),
            InvalidSnafu {
                name,
                reason: "layer name is empty"
            }
        );
        ensure!(
            !self.compatible_runtimes.is_empty(),
            InvalidSnafu {
                name,
                reason: "a layer needs at least one compatible runtime"
            }
        );
        Ok(())
    }

    async fn provision(&self, provider: &Synth, _outputs: &Outputs) -> Result<LayerOutput, crate::Error> {
        Ok(LayerOutput {
            layer_arn: provider.arn("lambda", &format!("layer:{}", self.layer_name)),
            layer_version_arn: Synth::token(&self.layer_name, "LayerVersionArn"),
        })
    }
}

/// Grants a function access to a table, and exposes the table's name to
/// the function through an environment variable.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, HasDependencies)]
pub struct TableGrant {
    pub table: Ref<Table>,
    #[dependencies(skip)]
    pub access: TableAccess,
    pub env_var: String,
}

/// Grants read access to the secrets whose names start with a prefix.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SecretGrant {
    pub name_prefix: String,
}

impl SecretGrant {
    fn is_wildcard(&self) -> bool {
        let prefix = self.name_prefix.trim();
        prefix.is_empty() || prefix.contains('*')
    }
}

/// A Lambda function.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Function {
    pub function_name: String,
    pub entry: EntryPoint,
    pub runtime: Runtime,
    pub memory_mb: u32,
    pub timeout_seconds: u32,
    pub architecture: Architecture,
    pub environment: BTreeMap<String, String>,
    pub table_grants: Vec<TableGrant>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secret_grants: Vec<SecretGrant>,
    /// Queues the function consumes messages from.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queue_grants: Vec<Ref<Queue>>,
    pub layers: Vec<Ref<Layer>>,
    pub log_retention_days: u32,
}

impl HasDependencies for Function {
    fn dependencies(&self) -> Dependencies {
        self.table_grants
            .dependencies()
            .merge(self.queue_grants.dependencies())
            .merge(self.layers.dependencies())
    }
}

impl Function {
    /// Returns whether the function may consume the queue with the given
    /// logical name.
    pub fn consumes(&self, queue: &str) -> bool {
        self.queue_grants.iter().any(|grant| grant.name() == queue)
    }

    /// Name of the execution role.
    pub fn role_name(&self) -> String {
        format!("{}-role", self.function_name)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FunctionOutput {
    pub function_name: String,
    pub arn: String,
    pub role_arn: String,
    pub managed_policies: Vec<String>,
    pub policy: serde_json::Value,
}

impl Descriptor for Function {
    const KIND: &'static str = "function";

    type Provider = Synth;
    type Error = crate::Error;
    type Output = FunctionOutput;

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        ensure!(
            !self.function_name.is_empty(),
            InvalidSnafu {
                name,
                reason: "function name is empty"
            }
        );
        ensure!(
            (MIN_MEMORY_MB..=MAX_MEMORY_MB).contains(&self.memory_mb),
            InvalidSnafu {
                name,
                reason: format!(
                    "memory {} MB is outside {MIN_MEMORY_MB}..={MAX_MEMORY_MB}",
                    self.memory_mb
                )
            }
        );
        ensure!(
            (1..=MAX_TIMEOUT_SECONDS).contains(&self.timeout_seconds),
            InvalidSnafu {
                name,
                reason: format!(
                    "timeout {}s is outside 1..={MAX_TIMEOUT_SECONDS}",
                    self.timeout_seconds
                )
            }
        );
        ensure!(
            !self.environment.is_empty(),
            InvalidSnafu {
                name,
                reason: "environment is empty"
            }
        );
        for (i, grant) in self.table_grants.iter().enumerate() {
            ensure!(
                self.environment.contains_key(&grant.env_var),
                InvalidSnafu {
                    name,
                    reason: format!(
                        "table '{}' is granted but {} is missing from the environment",
                        grant.table.name(),
                        grant.env_var
                    )
                }
            );
            ensure!(
                !self.table_grants[..i]
                    .iter()
                    .any(|other| other.table == grant.table),
                InvalidSnafu {
                    name,
                    reason: format!("table '{}' is granted twice", grant.table.name())
                }
            );
        }
        for (i, queue) in self.queue_grants.iter().enumerate() {
            ensure!(
                !self.queue_grants[..i].contains(queue),
                InvalidSnafu {
                    name,
                    reason: format!("queue '{}' is granted twice", queue.name())
                }
            );
        }
        for grant in self.secret_grants.iter() {
            ensure!(
                !grant.is_wildcard(),
                InvalidSnafu {
                    name,
                    reason: format!(
                        "secret grant '{}' must be a literal name prefix",
                        grant.name_prefix
                    )
                }
            );
        }
        Ok(())
    }

    async fn provision(&self, provider: &Synth, outputs: &Outputs) -> Result<FunctionOutput, crate::Error> {
        let mut statements = vec![];
        for grant in self.table_grants.iter() {
            let table = grant.table.get(outputs)?;
            log::debug!(
                "  granting {:?} on {} to {}",
                grant.access,
                table.table_name,
                self.function_name
            );
            statements.push(PolicyStatement::table(grant.access, &table.arn));
        }
        for grant in self.secret_grants.iter() {
            statements.push(PolicyStatement::secret_read(
                &provider.region,
                &provider.account,
                &grant.name_prefix,
            ));
        }
        for queue in self.queue_grants.iter() {
            let queue = queue.get(outputs)?;
            log::debug!("  granting consume on {} to {}", queue.arn, self.function_name);
            statements.push(PolicyStatement::queue_consume(&queue.arn));
        }
        // Layers must be provisioned before the function
        for layer in self.layers.iter() {
            let _ = layer.get(outputs)?;
        }

        Ok(FunctionOutput {
            function_name: self.function_name.clone(),
            arn: provider.arn("lambda", &format!("function:{}", self.function_name)),
            role_arn: provider.account_arn("iam", &format!("role/{}", self.role_name())),
            managed_policies: vec![iam::BASIC_EXECUTION_POLICY.to_owned()],
            policy: iam::policy_document(&statements),
        })
    }
}
