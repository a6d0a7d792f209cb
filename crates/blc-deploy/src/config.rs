//! Environment context.
//!
//! Everything a resolver needs to know about the target environment is
//! gathered once, into an immutable [`EnvironmentContext`]. No resolver reads
//! process state.
use std::path::{Path, PathBuf};

use snafu::prelude::*;

use crate::{
    aws::RemovalPolicy, utils, ConfigError, Error, InvalidEnvNameSnafu, MissingInputsSnafu,
    SettingsParseSnafu, SettingsReadSnafu, UnknownEnvTypeSnafu,
};

pub const DEFAULT_ENV_NAME: &str = "dev";
pub const DEFAULT_ENV_TYPE: &str = "dev";
pub const DEFAULT_BASE_DOMAIN: &str = "baselayercapital.com";
pub const DEFAULT_CERTIFICATE_ID: &str =
    "arn:aws:acm:us-east-1:740239033577:certificate/6e15ac94-f0b9-42ee-91c5-45d0c95efa81";

/// Type of environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvType {
    Dev,
    Staging,
    #[serde(rename = "prd")]
    Prod,
}

impl EnvType {
    pub const ALL: [EnvType; 3] = [EnvType::Dev, EnvType::Staging, EnvType::Prod];

    /// Production-like environments can't be configured out of their
    /// retention, protection and recovery guarantees.
    pub fn is_production(&self) -> bool {
        matches!(self, EnvType::Prod)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EnvType::Dev => "dev",
            EnvType::Staging => "staging",
            EnvType::Prod => "prd",
        }
    }
}

impl core::fmt::Display for EnvType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EnvType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(EnvType::Dev),
            "staging" | "stg" => Ok(EnvType::Staging),
            "prd" | "prod" | "production" => Ok(EnvType::Prod),
            _ => UnknownEnvTypeSnafu { value: s }.fail(),
        }
    }
}

/// Raw process inputs, as read by the composition root.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RawInputs {
    pub env_name: Option<String>,
    pub env_type: Option<String>,
    pub account_id: Option<String>,
    pub region: Option<String>,
    /// Deployment credential, eg the AWS profile name.
    pub credential: Option<String>,
}

/// Optional overrides of the values derived from the environment type.
///
/// Overrides have no effect on production-like environments.
#[derive(Debug, Default, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Overrides {
    pub retain_on_delete: Option<bool>,
    pub delete_protection: Option<bool>,
    pub point_in_time_recovery: Option<bool>,
}

/// Deployment settings, usually read from a TOML file.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_domain: String,
    pub certificate_id: String,
    /// Hosted zone id, used instead of a lookup when running offline.
    pub hosted_zone_id: Option<String>,
    /// Directory of the shared layer, containing a `requirements.txt`.
    pub layer_entry: PathBuf,
    /// Directory of the built frontend.
    pub frontend_dist: PathBuf,
    pub overrides: Overrides,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_domain: DEFAULT_BASE_DOMAIN.to_owned(),
            certificate_id: DEFAULT_CERTIFICATE_ID.to_owned(),
            hosted_zone_id: None,
            layer_entry: PathBuf::from("../src/python/layers/common_v1/"),
            frontend_dist: PathBuf::from("../frontend/dist"),
            overrides: Overrides::default(),
        }
    }
}

impl Settings {
    /// Reads settings from a TOML file. Missing keys take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        log::debug!("reading settings from {path:?}");
        let contents = std::fs::read_to_string(path).context(SettingsReadSnafu { path })?;
        Self::from_toml(&contents).context(SettingsParseSnafu { path })
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}

/// Deployment parameters of one environment.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EnvironmentContext {
    pub name: String,
    pub env_type: EnvType,
    pub account: String,
    pub region: String,
    pub credential: String,
    pub retain_on_delete: bool,
    pub delete_protection: bool,
    pub point_in_time_recovery: bool,
    pub base_domain: String,
    pub domain_name: String,
    pub certificate_id: String,
}

impl EnvironmentContext {
    pub fn builder(name: impl Into<String>, env_type: EnvType) -> ContextBuilder {
        ContextBuilder::new(name, env_type)
    }

    pub fn is_production(&self) -> bool {
        self.env_type.is_production()
    }

    /// The apex domain.
    pub fn apex(&self) -> &str {
        &self.base_domain
    }

    /// Hostname of the API custom domain.
    pub fn api_domain_name(&self) -> String {
        if self.is_production() {
            format!("api.{}", self.base_domain)
        } else {
            format!("api-{}", self.domain_name)
        }
    }

    /// Prefixes `suffix` with the environment name, eg `dev-Holdings`.
    pub fn resource_name(&self, suffix: &str) -> String {
        format!("{}-{suffix}", self.name)
    }

    pub fn removal_policy(&self) -> RemovalPolicy {
        if self.retain_on_delete {
            RemovalPolicy::Retain
        } else {
            RemovalPolicy::Destroy
        }
    }
}

/// Builds an [`EnvironmentContext`].
///
/// Fields are computed in a fixed order: environment type defaults first,
/// then [`Overrides`], then the production invariants, which always win.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    name: String,
    env_type: EnvType,
    account: String,
    region: String,
    credential: String,
    base_domain: String,
    certificate_id: String,
    overrides: Overrides,
}

impl ContextBuilder {
    pub fn new(name: impl Into<String>, env_type: EnvType) -> Self {
        Self {
            name: name.into(),
            env_type,
            account: String::new(),
            region: String::new(),
            credential: String::new(),
            base_domain: DEFAULT_BASE_DOMAIN.to_owned(),
            certificate_id: DEFAULT_CERTIFICATE_ID.to_owned(),
            overrides: Overrides::default(),
        }
    }

    pub fn account(mut self, account: impl Into<String>) -> Self {
        self.account = account.into();
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = credential.into();
        self
    }

    pub fn base_domain(mut self, base_domain: impl Into<String>) -> Self {
        self.base_domain = base_domain.into();
        self
    }

    pub fn certificate_id(mut self, certificate_id: impl Into<String>) -> Self {
        self.certificate_id = certificate_id.into();
        self
    }

    pub fn overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn build(self) -> Result<EnvironmentContext, ConfigError> {
        let Self {
            name,
            env_type,
            account,
            region,
            credential,
            base_domain,
            certificate_id,
            overrides,
        } = self;

        let missing = [
            ("AWS_ACCOUNT_ID", &account),
            ("AWS_REGION", &region),
            ("AWS_PROFILE", &credential),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect::<Vec<_>>();
        ensure!(missing.is_empty(), MissingInputsSnafu { names: missing });
        ensure!(
            utils::is_dns_label(&name),
            InvalidEnvNameSnafu { value: name.clone() }
        );

        // Environment type defaults
        let mut retain_on_delete = true;
        let mut delete_protection = env_type.is_production();
        let mut point_in_time_recovery = env_type.is_production();

        // Overrides
        if let Some(value) = overrides.retain_on_delete {
            retain_on_delete = value;
        }
        if let Some(value) = overrides.delete_protection {
            delete_protection = value;
        }
        if let Some(value) = overrides.point_in_time_recovery {
            point_in_time_recovery = value;
        }

        // Production invariants
        if env_type.is_production() {
            retain_on_delete = true;
            delete_protection = true;
            point_in_time_recovery = true;
        }

        let domain_name = if env_type.is_production() {
            base_domain.clone()
        } else {
            format!("{name}.{base_domain}")
        };

        Ok(EnvironmentContext {
            name,
            env_type,
            account: account.trim().to_owned(),
            region: region.trim().to_owned(),
            credential: credential.trim().to_owned(),
            retain_on_delete,
            delete_protection,
            point_in_time_recovery,
            base_domain,
            domain_name,
            certificate_id,
        })
    }
}

/// Resolves raw process inputs and settings into an [`EnvironmentContext`].
///
/// Every missing required input is reported at once, by [`ContextBuilder::build`].
pub fn resolve(raw: &RawInputs, settings: &Settings) -> Result<EnvironmentContext, ConfigError> {
    let env_name = raw
        .env_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_ENV_NAME);
    let env_type: EnvType = raw
        .env_type
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_ENV_TYPE)
        .parse()?;

    let ctx = ContextBuilder::new(env_name, env_type)
        .account(raw.account_id.clone().unwrap_or_default())
        .region(raw.region.clone().unwrap_or_default())
        .credential(raw.credential.clone().unwrap_or_default())
        .base_domain(settings.base_domain.clone())
        .certificate_id(settings.certificate_id.clone())
        .overrides(settings.overrides)
        .build()?;
    log::info!(
        "resolved environment '{}' ({}) in {}/{}",
        ctx.name,
        ctx.env_type,
        ctx.account,
        ctx.region
    );
    Ok(ctx)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn raw(env_name: &str, env_type: &str) -> RawInputs {
        RawInputs {
            env_name: Some(env_name.to_owned()),
            env_type: Some(env_type.to_owned()),
            account_id: Some("111".to_owned()),
            region: Some("us-east-1".to_owned()),
            credential: Some("x".to_owned()),
        }
    }

    fn all_overrides() -> [Overrides; 4] {
        [
            Overrides::default(),
            Overrides {
                retain_on_delete: Some(false),
                delete_protection: Some(false),
                point_in_time_recovery: Some(false),
            },
            Overrides {
                retain_on_delete: Some(true),
                delete_protection: Some(true),
                point_in_time_recovery: Some(true),
            },
            Overrides {
                retain_on_delete: Some(false),
                delete_protection: None,
                point_in_time_recovery: Some(true),
            },
        ]
    }

    #[test]
    fn env_type_parses_aliases() {
        assert_eq!(EnvType::Dev, "dev".parse().unwrap());
        assert_eq!(EnvType::Staging, "stg".parse().unwrap());
        assert_eq!(EnvType::Staging, "staging".parse().unwrap());
        assert_eq!(EnvType::Prod, "prd".parse().unwrap());
        assert_eq!(EnvType::Prod, "PROD".parse().unwrap());
        assert_eq!(
            Err(ConfigError::UnknownEnvType {
                value: "qa".to_owned()
            }),
            "qa".parse::<EnvType>()
        );
    }

    #[test]
    fn dev_context() {
        let ctx = resolve(&raw("dev", "dev"), &Settings::default()).unwrap();
        assert_eq!(
            EnvironmentContext {
                name: "dev".to_owned(),
                env_type: EnvType::Dev,
                account: "111".to_owned(),
                region: "us-east-1".to_owned(),
                credential: "x".to_owned(),
                retain_on_delete: true,
                delete_protection: false,
                point_in_time_recovery: false,
                base_domain: "baselayercapital.com".to_owned(),
                domain_name: "dev.baselayercapital.com".to_owned(),
                certificate_id: DEFAULT_CERTIFICATE_ID.to_owned(),
            },
            ctx
        );
        assert_eq!("api-dev.baselayercapital.com", ctx.api_domain_name());
        assert_eq!("dev-Holdings", ctx.resource_name("Holdings"));
    }

    #[test]
    fn production_invariants_win_over_overrides() {
        for overrides in all_overrides() {
            let settings = Settings {
                overrides,
                ..Default::default()
            };
            let ctx = resolve(&raw("prd", "prd"), &settings).unwrap();
            assert!(ctx.retain_on_delete, "{overrides:?}");
            assert!(ctx.delete_protection, "{overrides:?}");
            assert!(ctx.point_in_time_recovery, "{overrides:?}");
            assert_eq!("baselayercapital.com", ctx.domain_name);
            assert_eq!("api.baselayercapital.com", ctx.api_domain_name());
        }
    }

    #[test]
    fn overrides_apply_outside_production() {
        for env_type in ["dev", "staging"] {
            let settings = Settings {
                overrides: Overrides {
                    retain_on_delete: Some(false),
                    delete_protection: Some(true),
                    point_in_time_recovery: None,
                },
                ..Default::default()
            };
            let ctx = resolve(&raw("feature-1", env_type), &settings).unwrap();
            assert!(!ctx.retain_on_delete);
            assert!(ctx.delete_protection);
            assert!(!ctx.point_in_time_recovery);
            assert_eq!(RemovalPolicy::Destroy, ctx.removal_policy());
        }
    }

    #[test]
    fn missing_inputs_are_reported_together() {
        let mut inputs = raw("dev", "dev");
        inputs.account_id = None;
        inputs.credential = Some("  ".to_owned());
        assert_eq!(
            Err(ConfigError::MissingInputs {
                names: vec!["AWS_ACCOUNT_ID", "AWS_PROFILE"]
            }),
            resolve(&inputs, &Settings::default())
        );
    }

    #[test]
    fn builder_reports_missing_inputs() {
        assert_eq!(
            Err(ConfigError::MissingInputs {
                names: vec!["AWS_ACCOUNT_ID", "AWS_REGION", "AWS_PROFILE"]
            }),
            ContextBuilder::new("dev", EnvType::Dev).build()
        );
        assert_eq!(
            Err(ConfigError::MissingInputs {
                names: vec!["AWS_REGION"]
            }),
            ContextBuilder::new("dev", EnvType::Dev)
                .account("111")
                .region(" ")
                .credential("x")
                .build()
        );
    }

    #[test]
    fn env_name_and_type_default_to_dev() {
        let inputs = RawInputs {
            env_name: None,
            env_type: None,
            ..raw("", "")
        };
        let ctx = resolve(&inputs, &Settings::default()).unwrap();
        assert_eq!("dev", ctx.name);
        assert_eq!(EnvType::Dev, ctx.env_type);
    }

    #[test]
    fn env_name_must_be_a_dns_label() {
        assert_eq!(
            Err(ConfigError::InvalidEnvName {
                value: "My_Env".to_owned()
            }),
            resolve(&raw("My_Env", "dev"), &Settings::default())
        );
    }

    #[test]
    fn settings_from_toml() {
        let settings = Settings::from_toml(
            r#"
            base_domain = "example.com"
            hosted_zone_id = "Z123"

            [overrides]
            retain_on_delete = false
            "#,
        )
        .unwrap();
        assert_eq!("example.com", settings.base_domain);
        assert_eq!(Some("Z123".to_owned()), settings.hosted_zone_id);
        assert_eq!(Some(false), settings.overrides.retain_on_delete);
        assert_eq!(DEFAULT_CERTIFICATE_ID, settings.certificate_id);
    }
}
