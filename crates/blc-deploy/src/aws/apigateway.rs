//! API Gateway REST APIs.
use std::collections::{BTreeMap, BTreeSet};

use snafu::prelude::*;

use super::{acm::Certificate, lambda::Function};
use crate::{
    remote::{Outputs, Ref},
    synth::Synth,
    ConfigError, Dependencies, Descriptor, HasDependencies, InvalidSnafu,
};

pub const ALL_METHODS: &[&str] = &["OPTIONS", "GET", "PUT", "POST", "DELETE", "PATCH", "HEAD"];

pub const DEFAULT_HEADERS: &[&str] = &[
    "Content-Type",
    "X-Amz-Date",
    "Authorization",
    "X-Api-Key",
    "X-Amz-Security-Token",
    "X-Amz-User-Agent",
];

/// Origins allowed by a CORS policy.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowedOrigins {
    /// The `*` wildcard.
    Any,
    List(BTreeSet<String>),
}

impl AllowedOrigins {
    pub fn is_wildcard(&self) -> bool {
        match self {
            AllowedOrigins::Any => true,
            AllowedOrigins::List(origins) => origins.iter().any(|origin| origin == "*"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CorsPolicy {
    pub allowed_origins: AllowedOrigins,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_seconds: u32,
}

impl CorsPolicy {
    /// Returns whether the policy is well formed.
    ///
    /// Credentialed CORS needs an explicit, non-empty set of origins.
    pub fn is_valid(&self) -> bool {
        if !self.allow_credentials {
            return true;
        }
        match &self.allowed_origins {
            AllowedOrigins::Any => false,
            AllowedOrigins::List(origins) => {
                !origins.is_empty() && !self.allowed_origins.is_wildcard()
            }
        }
    }

    /// Headers to attach to responses, as gateway response parameter
    /// values (single quoted literals).
    pub fn response_headers(&self) -> BTreeMap<String, String> {
        let origin = match &self.allowed_origins {
            AllowedOrigins::Any => "*".to_owned(),
            AllowedOrigins::List(origins) => origins.iter().next().cloned().unwrap_or_default(),
        };
        let mut headers = BTreeMap::from([
            (
                "Access-Control-Allow-Origin".to_owned(),
                format!("'{origin}'"),
            ),
            (
                "Access-Control-Allow-Headers".to_owned(),
                format!("'{}'", self.allowed_headers.join(",")),
            ),
            (
                "Access-Control-Allow-Methods".to_owned(),
                format!("'{}'", self.allowed_methods.join(",")),
            ),
        ]);
        if self.allow_credentials {
            headers.insert(
                "Access-Control-Allow-Credentials".to_owned(),
                "'true'".to_owned(),
            );
        }
        headers
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum EndpointType {
    Regional,
}

/// A custom domain name bound to the API.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, HasDependencies)]
pub struct CustomDomain {
    pub domain_name: String,
    pub certificate: Ref<Certificate>,
    #[dependencies(skip)]
    pub endpoint_type: EndpointType,
}

/// A route that proxies every request under `path_pattern` into a function.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, HasDependencies)]
pub struct Route {
    pub path_pattern: String,
    pub target: Ref<Function>,
    pub methods: Vec<String>,
}

impl Route {
    /// The fixed prefix of the route, eg `userservice` for
    /// `/userservice/{proxy+}`.
    pub fn prefix(&self) -> &str {
        self.path_pattern
            .trim_start_matches('/')
            .split('/')
            .next()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseType {
    #[serde(rename = "DEFAULT_4XX")]
    Default4xx,
    Unauthorized,
}

/// A templated response the gateway sends instead of invoking a route.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GatewayResponse {
    pub response_type: ResponseType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub template: String,
    pub headers: BTreeMap<String, String>,
}

/// Allows the gateway to invoke a function.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, HasDependencies)]
pub struct InvokePermission {
    pub function: Ref<Function>,
    pub principal: String,
    pub action: String,
    /// Appended to the API's execute ARN, eg `*/*/userservice/*`.
    pub source_pattern: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StageOptions {
    pub stage_name: String,
    pub data_trace_enabled: bool,
    pub metrics_enabled: bool,
    pub tracing_enabled: bool,
}

impl Default for StageOptions {
    fn default() -> Self {
        Self {
            stage_name: "prod".to_owned(),
            data_trace_enabled: false,
            metrics_enabled: false,
            tracing_enabled: false,
        }
    }
}

/// A REST API.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Gateway {
    pub api_name: String,
    pub cors: CorsPolicy,
    pub custom_domain: CustomDomain,
    pub routes: Vec<Route>,
    pub gateway_responses: Vec<GatewayResponse>,
    pub invoke_permissions: Vec<InvokePermission>,
    pub stage: StageOptions,
}

impl HasDependencies for Gateway {
    fn dependencies(&self) -> Dependencies {
        self.custom_domain
            .dependencies()
            .merge(self.routes.dependencies())
            .merge(self.invoke_permissions.dependencies())
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CustomDomainOutput {
    pub domain_name: String,
    pub regional_domain_name: String,
    pub regional_hosted_zone_id: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GatewayOutput {
    pub api_id: String,
    pub url: String,
    pub custom_domain: CustomDomainOutput,
    /// Source ARN of each invoke permission.
    pub permission_source_arns: Vec<String>,
}

impl Descriptor for Gateway {
    const KIND: &'static str = "gateway";

    type Provider = Synth;
    type Error = crate::Error;
    type Output = GatewayOutput;

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        ensure!(
            self.cors.is_valid(),
            InvalidSnafu {
                name,
                reason: "credentialed CORS requires an explicit set of origins"
            }
        );
        ensure!(
            !self.routes.is_empty(),
            InvalidSnafu {
                name,
                reason: "a gateway needs at least one route"
            }
        );
        for route in self.routes.iter() {
            ensure!(
                route.path_pattern.starts_with('/') && !route.prefix().is_empty(),
                InvalidSnafu {
                    name,
                    reason: format!("route '{}' needs a fixed prefix", route.path_pattern)
                }
            );
            ensure!(
                !route.methods.is_empty(),
                InvalidSnafu {
                    name,
                    reason: format!("route '{}' allows no methods", route.path_pattern)
                }
            );
        }
        let cors_headers = self.cors.response_headers();
        for response in self.gateway_responses.iter() {
            ensure!(
                response.headers == cors_headers,
                InvalidSnafu {
                    name,
                    reason: format!(
                        "gateway response {:?} must carry the CORS headers",
                        response.response_type
                    )
                }
            );
        }
        for permission in self.invoke_permissions.iter() {
            ensure!(
                self.routes
                    .iter()
                    .any(|route| route.target == permission.function),
                InvalidSnafu {
                    name,
                    reason: format!(
                        "invoke permission for '{}' which no route targets",
                        permission.function.name()
                    )
                }
            );
            ensure!(
                !permission.source_pattern.is_empty() && permission.source_pattern != "*",
                InvalidSnafu {
                    name,
                    reason: "invoke permissions must be scoped to a route pattern"
                }
            );
        }
        Ok(())
    }

    async fn provision(&self, provider: &Synth, outputs: &Outputs) -> Result<GatewayOutput, crate::Error> {
        let certificate = self.custom_domain.certificate.get(outputs)?;
        log::debug!(
            "  {} uses certificate {}",
            self.custom_domain.domain_name,
            certificate.arn
        );
        for route in self.routes.iter() {
            let function = route.target.get(outputs)?;
            log::debug!("  {} -> {}", route.path_pattern, function.function_name);
        }

        let api_id = Synth::token(&self.api_name, "RestApiId");
        let execute_arn = provider.arn("execute-api", &api_id);
        let permission_source_arns = self
            .invoke_permissions
            .iter()
            .map(|permission| {
                permission.function.get(outputs)?;
                Ok(format!("{execute_arn}/{}", permission.source_pattern))
            })
            .collect::<Result<Vec<_>, crate::Error>>()?;
        let domain_id = format!("{}.{}", self.api_name, self.custom_domain.domain_name);

        Ok(GatewayOutput {
            url: format!(
                "https://{api_id}.execute-api.{}.amazonaws.com/{}/",
                provider.region, self.stage.stage_name
            ),
            api_id,
            custom_domain: CustomDomainOutput {
                domain_name: self.custom_domain.domain_name.clone(),
                regional_domain_name: Synth::token(&domain_id, "RegionalDomainName"),
                regional_hosted_zone_id: Synth::token(&domain_id, "RegionalHostedZoneId"),
            },
            permission_source_arns,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn credentialed(origins: AllowedOrigins) -> CorsPolicy {
        CorsPolicy {
            allowed_origins: origins,
            allowed_methods: ALL_METHODS.iter().map(|s| s.to_string()).collect(),
            allowed_headers: DEFAULT_HEADERS.iter().map(|s| s.to_string()).collect(),
            allow_credentials: true,
            max_age_seconds: 86_400,
        }
    }

    #[test]
    fn credentials_need_explicit_origins() {
        assert!(!credentialed(AllowedOrigins::Any).is_valid());
        assert!(!credentialed(AllowedOrigins::List(BTreeSet::new())).is_valid());
        assert!(!credentialed(AllowedOrigins::List(BTreeSet::from(["*".to_owned()]))).is_valid());
        assert!(credentialed(AllowedOrigins::List(BTreeSet::from([
            "https://baselayercapital.com".to_owned()
        ])))
        .is_valid());

        let mut open = credentialed(AllowedOrigins::Any);
        open.allow_credentials = false;
        assert!(open.is_valid());
    }

    #[test]
    fn response_headers() {
        let cors = credentialed(AllowedOrigins::List(BTreeSet::from([
            "https://www.baselayercapital.com".to_owned(),
            "https://baselayercapital.com".to_owned(),
        ])));
        let headers = cors.response_headers();
        assert_eq!(
            "'https://baselayercapital.com'",
            headers["Access-Control-Allow-Origin"]
        );
        assert_eq!("'true'", headers["Access-Control-Allow-Credentials"]);
        assert_eq!(
            "'Content-Type,X-Amz-Date,Authorization,X-Api-Key,X-Amz-Security-Token,X-Amz-User-Agent'",
            headers["Access-Control-Allow-Headers"]
        );
    }

    #[test]
    fn route_prefix() {
        let route = Route {
            path_pattern: "/userservice/{proxy+}".to_owned(),
            target: Ref::new("user-service"),
            methods: vec!["ANY".to_owned()],
        };
        assert_eq!("userservice", route.prefix());
    }

    #[test]
    fn response_types_serialize_like_aws() {
        assert_eq!(
            "\"DEFAULT_4XX\"",
            serde_json::to_string(&ResponseType::Default4xx).unwrap()
        );
        assert_eq!(
            "\"UNAUTHORIZED\"",
            serde_json::to_string(&ResponseType::Unauthorized).unwrap()
        );
    }
}
