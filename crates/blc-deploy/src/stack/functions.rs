//! Functions, their shared layer and the ingest queue.
use std::collections::BTreeMap;

use super::tables::{self, TableSet};
use crate::{
    aws::{
        iam::TableAccess,
        lambda::{Architecture, EntryPoint, Function, Layer, Runtime, SecretGrant, TableGrant},
        sqs::Queue,
    },
    collaborator::LayerBundle,
    config::EnvironmentContext,
    remote::{qualified_id, Ref},
    utils, ConfigError, Descriptor,
};

pub const FETCH_DATA: &str = "fetch-data";
pub const FETCH_STRATEGY_KPIS: &str = "fetch-strategy-kpis";
pub const INGEST_TRANSACTIONS: &str = "ingest-transactions";
pub const USER_SERVICE: &str = "user-service";

pub const PEPPER_SECRET_PREFIX: &str = "baselayercapital/PEPPER";

const LAMBDAS_DIR: &str = "../src/python/lambdas";

pub const DEFAULT_MEMORY_MB: u32 = 512;
pub const DEFAULT_TIMEOUT_SECONDS: u32 = 30;
pub const DEFAULT_LOG_RETENTION_DAYS: u32 = 1;

/// Visibility timeout of the ingest queue, six times the function timeout.
pub const INGEST_VISIBILITY_TIMEOUT_SECONDS: u32 = 6 * DEFAULT_TIMEOUT_SECONDS;
pub const INGEST_RETENTION_SECONDS: u32 = 4 * 24 * 60 * 60;

/// What a function is, before it is bound to an environment.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSpec {
    pub name: &'static str,
    /// Suffix of the physical name, eg `FetchDataLambda`.
    pub suffix: &'static str,
    pub entry: EntryPoint,
    pub tables: Vec<(&'static str, TableAccess)>,
    pub secret_prefixes: Vec<&'static str>,
    /// Logical names of the queues the function consumes.
    pub queues: Vec<&'static str>,
}

/// The functions of the application.
pub fn function_specs() -> Vec<FunctionSpec> {
    let entry = |dir: &str, index: &str| EntryPoint::new(format!("{LAMBDAS_DIR}/{dir}"), index);
    vec![
        FunctionSpec {
            name: FETCH_DATA,
            suffix: "FetchDataLambda",
            entry: entry("fetch_data_lambda", "fetch_data_lambda.py"),
            tables: vec![(tables::HISTORICAL_DATA, TableAccess::ReadWrite)],
            secret_prefixes: vec![],
            queues: vec![],
        },
        FunctionSpec {
            name: FETCH_STRATEGY_KPIS,
            suffix: "FetchStrategyKPIsLambda",
            entry: entry("fetch_strategy_kpis_lambda", "fetch_strategy_kpis_lambda.py"),
            tables: vec![
                (tables::KPIS, TableAccess::ReadWrite),
                (tables::HOLDINGS, TableAccess::Read),
            ],
            secret_prefixes: vec![],
            queues: vec![],
        },
        FunctionSpec {
            name: INGEST_TRANSACTIONS,
            suffix: "IngestTransactionsLambda",
            entry: entry("ingest_lambda", "ingest_schwab_transactions.py"),
            tables: vec![(tables::TRANSACTIONS, TableAccess::ReadWrite)],
            secret_prefixes: vec![],
            queues: vec![super::QUEUE],
        },
        FunctionSpec {
            name: USER_SERVICE,
            suffix: "UserServiceLambda",
            entry: entry("userservice", "api.py"),
            tables: vec![(tables::USER_SERVICE, TableAccess::ReadWrite)],
            secret_prefixes: vec![PEPPER_SECRET_PREFIX],
            queues: vec![],
        },
    ]
}

/// Resolved functions, by logical name.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FunctionSet {
    functions: BTreeMap<String, Function>,
}

impl FunctionSet {
    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Function)> {
        self.functions
            .iter()
            .map(|(name, function)| (name.as_str(), function))
    }

    /// Returns a reference to the function with the given logical name.
    ///
    /// ## Errors
    /// Errs if there is no such function, naming `from` as the referrer.
    pub fn reference(&self, from: &str, name: &str) -> Result<Ref<Function>, ConfigError> {
        if self.contains(name) {
            Ok(Ref::new(name))
        } else {
            Err(ConfigError::DanglingReference {
                from: from.to_owned(),
                to: qualified_id(Function::KIND, name),
            })
        }
    }
}

/// Resolves the shared dependency layer from its bundle.
pub fn resolve_layer(ctx: &EnvironmentContext, bundle: &LayerBundle) -> Layer {
    Layer {
        layer_name: ctx.resource_name("common_v1"),
        entry: bundle.entry.clone(),
        requirements: bundle.requirements.clone(),
        compatible_runtimes: vec![Runtime::Python312],
        description: "A common layer for Python Lambda".to_owned(),
        content_hash: bundle.content_hash.clone(),
    }
}

/// Resolves the queue that feeds the ingest function.
pub fn resolve_queue(ctx: &EnvironmentContext) -> Queue {
    Queue {
        queue_name: ctx.resource_name("IngestQueue"),
        visibility_timeout_seconds: INGEST_VISIBILITY_TIMEOUT_SECONDS,
        retention_period_seconds: INGEST_RETENTION_SECONDS,
    }
}

/// Resolves the functions of the application.
pub fn resolve_functions(
    ctx: &EnvironmentContext,
    tables: &TableSet,
    layer: &Ref<Layer>,
) -> Result<FunctionSet, ConfigError> {
    resolve_functions_from(ctx, tables, layer, &function_specs())
}

/// Resolves the given function specs.
///
/// Each function is granted exactly the tables its spec names, and the
/// physical name of each granted table is exposed as
/// `{LOGICAL_NAME}_TABLE_NAME`.
///
/// ## Errors
/// Errs if a spec names a table that is not in `tables`.
pub fn resolve_functions_from(
    ctx: &EnvironmentContext,
    tables: &TableSet,
    layer: &Ref<Layer>,
    specs: &[FunctionSpec],
) -> Result<FunctionSet, ConfigError> {
    let mut functions = BTreeMap::new();
    for spec in specs.iter() {
        let from = qualified_id(Function::KIND, spec.name);
        let mut environment = BTreeMap::from([
            ("REGION".to_owned(), ctx.region.clone()),
            ("ENV_NAME".to_owned(), ctx.name.clone()),
            ("ENV_TYPE".to_owned(), ctx.env_type.to_string()),
        ]);
        let mut table_grants = vec![];
        for (table_name, access) in spec.tables.iter() {
            let table = tables.reference(&from, table_name)?;
            let env_var = format!("{}_TABLE_NAME", utils::screaming_snake(table_name));
            let physical = tables
                .get(table_name)
                .map(|t| t.table_name.clone())
                .unwrap_or_default();
            environment.insert(env_var.clone(), physical);
            table_grants.push(TableGrant {
                table,
                access: *access,
                env_var,
            });
        }

        let function = Function {
            function_name: ctx.resource_name(spec.suffix),
            entry: spec.entry.clone(),
            runtime: Runtime::Python312,
            memory_mb: DEFAULT_MEMORY_MB,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            architecture: Architecture::Arm64,
            environment,
            table_grants,
            secret_grants: spec
                .secret_prefixes
                .iter()
                .map(|prefix| SecretGrant {
                    name_prefix: prefix.to_string(),
                })
                .collect(),
            queue_grants: spec.queues.iter().map(|queue| Ref::new(*queue)).collect(),
            layers: vec![layer.clone()],
            log_retention_days: DEFAULT_LOG_RETENTION_DAYS,
        };
        function.validate(spec.name)?;
        if functions.insert(spec.name.to_owned(), function).is_some() {
            return Err(ConfigError::DuplicateName { name: from });
        }
    }
    Ok(FunctionSet { functions })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        config::{EnvType, EnvironmentContext},
        stack::tables::resolve_tables,
    };
    use pretty_assertions::assert_eq;

    fn ctx() -> EnvironmentContext {
        EnvironmentContext::builder("dev", EnvType::Dev)
            .account("111")
            .region("us-east-1")
            .credential("x")
            .build()
            .unwrap()
    }

    fn functions() -> FunctionSet {
        let ctx = ctx();
        resolve_functions(&ctx, &resolve_tables(&ctx), &Ref::new("common")).unwrap()
    }

    #[test]
    fn least_privilege() {
        let functions = functions();
        let granted = |name: &str| {
            functions
                .get(name)
                .unwrap()
                .table_grants
                .iter()
                .map(|grant| (grant.table.name().to_owned(), grant.access))
                .collect::<Vec<_>>()
        };
        assert_eq!(
            vec![("historical-data".to_owned(), TableAccess::ReadWrite)],
            granted(FETCH_DATA)
        );
        assert_eq!(
            vec![
                ("kpis".to_owned(), TableAccess::ReadWrite),
                ("holdings".to_owned(), TableAccess::Read)
            ],
            granted(FETCH_STRATEGY_KPIS)
        );
        assert_eq!(
            vec![("transactions".to_owned(), TableAccess::ReadWrite)],
            granted(INGEST_TRANSACTIONS)
        );
        assert_eq!(
            vec![("user-service".to_owned(), TableAccess::ReadWrite)],
            granted(USER_SERVICE)
        );
    }

    #[test]
    fn only_user_service_reads_the_pepper() {
        for (name, function) in functions().iter() {
            if name == USER_SERVICE {
                assert_eq!(
                    vec![SecretGrant {
                        name_prefix: PEPPER_SECRET_PREFIX.to_owned()
                    }],
                    function.secret_grants
                );
            } else {
                assert!(function.secret_grants.is_empty());
            }
        }
    }

    #[test]
    fn only_ingest_consumes_the_queue() {
        for (name, function) in functions().iter() {
            assert_eq!(name == INGEST_TRANSACTIONS, function.consumes("ingest"), "{name}");
        }
    }

    #[test]
    fn environment_maps_table_names() {
        let functions = functions();
        let f = functions.get(FETCH_STRATEGY_KPIS).unwrap();
        assert_eq!(
            BTreeMap::from([
                ("ENV_NAME".to_owned(), "dev".to_owned()),
                ("ENV_TYPE".to_owned(), "dev".to_owned()),
                ("HOLDINGS_TABLE_NAME".to_owned(), "dev-Holdings".to_owned()),
                ("KPIS_TABLE_NAME".to_owned(), "dev-StrategyKPIs".to_owned()),
                ("REGION".to_owned(), "us-east-1".to_owned()),
            ]),
            f.environment
        );
        assert_eq!("dev-FetchStrategyKPIsLambda", f.function_name);
        assert_eq!(512, f.memory_mb);
        assert_eq!(30, f.timeout_seconds);
        assert_eq!(Architecture::Arm64, f.architecture);
        assert_eq!(vec![Ref::new("common")], f.layers);
    }

    #[test]
    fn unknown_tables_are_dangling() {
        let ctx = ctx();
        let mut specs = function_specs();
        specs[0].tables.push(("events", TableAccess::Read));
        assert_eq!(
            Err(ConfigError::DanglingReference {
                from: "function/fetch-data".to_owned(),
                to: "table/events".to_owned(),
            }),
            resolve_functions_from(&ctx, &resolve_tables(&ctx), &Ref::new("common"), &specs)
        );
    }

    #[test]
    fn layer_and_queue_are_scoped_to_the_environment() {
        let ctx = ctx();
        let layer = resolve_layer(
            &ctx,
            &LayerBundle {
                entry: "layers/common_v1".to_owned(),
                requirements: "layers/common_v1/requirements.txt".to_owned(),
                content_hash: Some("abc".to_owned()),
            },
        );
        assert_eq!("dev-common_v1", layer.layer_name);
        assert_eq!(Some("abc".to_owned()), layer.content_hash);
        assert_eq!("dev-IngestQueue", resolve_queue(&ctx).queue_name);
    }
}
