//! AWS DynamoDB tables.
use snafu::prelude::*;

use crate::{remote::Outputs, synth::Synth, ConfigError, Descriptor, HasDependencies, InvalidSnafu};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum KeyType {
    Hash,
    Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AttributeType {
    Binary,
    Number,
    String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct KeySchemaElement {
    pub attribute_name: String,
    pub key_type: KeyType,
    pub attribute_type: AttributeType,
}

impl KeySchemaElement {
    pub fn partition_key(name: impl Into<String>, type_is: AttributeType) -> Self {
        KeySchemaElement {
            attribute_name: name.into(),
            key_type: KeyType::Hash,
            attribute_type: type_is,
        }
    }

    pub fn sort_key(name: impl Into<String>, type_is: AttributeType) -> Self {
        KeySchemaElement {
            attribute_name: name.into(),
            key_type: KeyType::Range,
            attribute_type: type_is,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BillingMode {
    PayPerRequest,
}

/// Which attributes are copied into a secondary index.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Projection {
    All,
}

/// A global secondary index.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SecondaryIndex {
    pub index_name: String,
    pub partition_key: KeySchemaElement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_key: Option<KeySchemaElement>,
    pub projection: Projection,
}

/// A DynamoDB table.
///
/// Tables in this deployment follow a single-table design: every table is
/// keyed by a string partition key `PK` and a string sort key `SK`, and
/// entities are told apart by key prefixes.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Table {
    pub table_name: String,
    pub partition_key: KeySchemaElement,
    pub sort_key: KeySchemaElement,
    pub billing_mode: BillingMode,
    pub removal_policy: super::RemovalPolicy,
    pub delete_protection: bool,
    pub point_in_time_recovery: bool,
    /// At most one secondary index per table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_index: Option<SecondaryIndex>,
}

impl HasDependencies for Table {}

impl Table {
    pub const PARTITION_KEY: &'static str = "PK";
    pub const SORT_KEY: &'static str = "SK";

    /// A pay-per-request table with the `PK`/`SK` key schema.
    pub fn single_table(
        table_name: impl Into<String>,
        removal_policy: super::RemovalPolicy,
    ) -> Self {
        Table {
            table_name: table_name.into(),
            partition_key: KeySchemaElement::partition_key(
                Self::PARTITION_KEY,
                AttributeType::String,
            ),
            sort_key: KeySchemaElement::sort_key(Self::SORT_KEY, AttributeType::String),
            billing_mode: BillingMode::PayPerRequest,
            removal_policy,
            delete_protection: false,
            point_in_time_recovery: false,
            secondary_index: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TableOutput {
    pub table_name: String,
    pub arn: String,
}

impl Descriptor for Table {
    const KIND: &'static str = "table";

    type Provider = Synth;
    type Error = crate::Error;
    type Output = TableOutput;

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        ensure!(
            !self.table_name.is_empty(),
            InvalidSnafu {
                name,
                reason: "table name is empty"
            }
        );
        ensure!(
            !self.partition_key.attribute_name.is_empty() && !self.sort_key.attribute_name.is_empty(),
            InvalidSnafu {
                name,
                reason: "key names must not be empty"
            }
        );
        ensure!(
            self.partition_key.key_type == KeyType::Hash && self.sort_key.key_type == KeyType::Range,
            InvalidSnafu {
                name,
                reason: "partition key must be a hash key and sort key a range key"
            }
        );
        ensure!(
            self.partition_key.attribute_name != self.sort_key.attribute_name,
            InvalidSnafu {
                name,
                reason: "partition and sort keys must differ"
            }
        );
        if let Some(index) = self.secondary_index.as_ref() {
            ensure!(
                !index.index_name.is_empty() && !index.partition_key.attribute_name.is_empty(),
                InvalidSnafu {
                    name,
                    reason: "secondary index needs a name and a partition key"
                }
            );
        }
        Ok(())
    }

    async fn provision(&self, provider: &Synth, _outputs: &Outputs) -> Result<TableOutput, crate::Error> {
        Ok(TableOutput {
            table_name: self.table_name.clone(),
            arn: provider.arn("dynamodb", &format!("table/{}", self.table_name)),
        })
    }
}
