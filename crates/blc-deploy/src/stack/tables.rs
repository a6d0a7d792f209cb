//! Storage tables.
use std::collections::BTreeMap;

use crate::{
    aws::dynamodb::{AttributeType, KeySchemaElement, Projection, SecondaryIndex, Table},
    config::EnvironmentContext,
    remote::{qualified_id, Ref},
    ConfigError, Descriptor,
};

pub const HOLDINGS: &str = "holdings";
pub const TRANSACTIONS: &str = "transactions";
pub const USER_SERVICE: &str = "user-service";
pub const HISTORICAL_DATA: &str = "historical-data";
pub const KPIS: &str = "kpis";

pub const EMAIL_INDEX: &str = "email-index";

/// Logical names and physical name suffixes of every table.
const TABLES: &[(&str, &str)] = &[
    (HOLDINGS, "Holdings"),
    (TRANSACTIONS, "Transactions"),
    (USER_SERVICE, "UserService"),
    (HISTORICAL_DATA, "HistoricalData"),
    (KPIS, "StrategyKPIs"),
];

/// Resolved tables, by logical name.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TableSet {
    tables: BTreeMap<String, Table>,
}

impl TableSet {
    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Table)> {
        self.tables.iter().map(|(name, table)| (name.as_str(), table))
    }

    /// Returns a reference to the table with the given logical name.
    ///
    /// ## Errors
    /// Errs if there is no such table, naming `from` as the referrer.
    pub fn reference(&self, from: &str, name: &str) -> Result<Ref<Table>, ConfigError> {
        if self.contains(name) {
            Ok(Ref::new(name))
        } else {
            Err(ConfigError::DanglingReference {
                from: from.to_owned(),
                to: qualified_id(Table::KIND, name),
            })
        }
    }
}

impl FromIterator<(String, Table)> for TableSet {
    fn from_iter<I: IntoIterator<Item = (String, Table)>>(iter: I) -> Self {
        TableSet {
            tables: iter.into_iter().collect(),
        }
    }
}

/// Resolves the tables of the environment.
///
/// Every table uses the `PK`/`SK` schema with pay-per-request billing, and
/// takes its retention, protection and recovery settings from `ctx`.
pub fn resolve_tables(ctx: &EnvironmentContext) -> TableSet {
    TABLES
        .iter()
        .map(|(name, suffix)| {
            let mut table = Table::single_table(ctx.resource_name(suffix), ctx.removal_policy());
            table.delete_protection = ctx.delete_protection;
            table.point_in_time_recovery = ctx.point_in_time_recovery;
            if *name == USER_SERVICE {
                table.secondary_index = Some(SecondaryIndex {
                    index_name: EMAIL_INDEX.to_owned(),
                    partition_key: KeySchemaElement::partition_key("email", AttributeType::String),
                    sort_key: None,
                    projection: Projection::All,
                });
            }
            log::trace!("resolved table {name}: {}", table.table_name);
            (name.to_string(), table)
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::{EnvType, EnvironmentContext};
    use pretty_assertions::assert_eq;

    fn ctx(env_type: EnvType) -> EnvironmentContext {
        EnvironmentContext::builder("dev", env_type)
            .account("111")
            .region("us-east-1")
            .credential("x")
            .build()
            .unwrap()
    }

    #[test]
    fn five_tables_with_physical_names() {
        let tables = resolve_tables(&ctx(EnvType::Dev));
        let names = tables
            .iter()
            .map(|(name, table)| (name, table.table_name.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            vec![
                ("historical-data", "dev-HistoricalData"),
                ("holdings", "dev-Holdings"),
                ("kpis", "dev-StrategyKPIs"),
                ("transactions", "dev-Transactions"),
                ("user-service", "dev-UserService"),
            ],
            names
        );
    }

    #[test]
    fn keys_are_valid_everywhere() {
        for env_type in EnvType::ALL {
            for (name, table) in resolve_tables(&ctx(env_type)).iter() {
                assert!(!table.partition_key.attribute_name.is_empty());
                assert!(!table.sort_key.attribute_name.is_empty());
                assert!(table.validate(name).is_ok());
            }
        }
    }

    #[test]
    fn only_user_service_has_the_email_index() {
        let tables = resolve_tables(&ctx(EnvType::Dev));
        for (name, table) in tables.iter() {
            if name == USER_SERVICE {
                let index = table.secondary_index.as_ref().unwrap();
                assert_eq!(EMAIL_INDEX, index.index_name);
                assert_eq!("email", index.partition_key.attribute_name);
                assert_eq!(Projection::All, index.projection);
            } else {
                assert_eq!(None, table.secondary_index);
            }
        }
    }

    #[test]
    fn dangling_table_reference() {
        let tables = resolve_tables(&ctx(EnvType::Dev));
        assert_eq!(
            Err(ConfigError::DanglingReference {
                from: "function/fetch-data".to_owned(),
                to: "table/events".to_owned(),
            }),
            tables.reference("function/fetch-data", "events")
        );
        assert_eq!(
            Ref::new(KPIS),
            tables.reference("function/fetch-strategy-kpis", KPIS).unwrap()
        );
    }
}
