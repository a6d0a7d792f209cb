//! The user service API.
use std::collections::BTreeSet;

use super::functions::{self, FunctionSet};
use crate::{
    aws::{
        acm::Certificate,
        apigateway::{
            AllowedOrigins, CorsPolicy, CustomDomain, EndpointType, Gateway, GatewayResponse,
            InvokePermission, ResponseType, Route, StageOptions, ALL_METHODS, DEFAULT_HEADERS,
        },
    },
    config::EnvironmentContext,
    remote::{qualified_id, Ref},
    ConfigError, Descriptor,
};

pub const USER_SERVICE_ROUTE: &str = "/userservice/{proxy+}";
pub const CORS_MAX_AGE_SECONDS: u32 = 24 * 60 * 60;

const NOT_FOUND_TEMPLATE: &str = r#"{"message":"It seems you are lost"}"#;
const UNAUTHORIZED_TEMPLATE: &str = r#"{"message":"Unauthorized"}"#;

/// The CORS policy of the API.
///
/// Production only allows the apex and its `www` alias, with credentials.
/// Every other environment allows any origin, without credentials.
pub fn cors_policy(ctx: &EnvironmentContext) -> CorsPolicy {
    let (allowed_origins, allow_credentials) = if ctx.is_production() {
        let apex = ctx.apex();
        (
            AllowedOrigins::List(BTreeSet::from([
                format!("https://{apex}"),
                format!("https://www.{apex}"),
            ])),
            true,
        )
    } else {
        (AllowedOrigins::Any, false)
    };
    CorsPolicy {
        allowed_origins,
        allowed_methods: ALL_METHODS.iter().map(|m| m.to_string()).collect(),
        allowed_headers: DEFAULT_HEADERS.iter().map(|h| h.to_string()).collect(),
        allow_credentials,
        max_age_seconds: CORS_MAX_AGE_SECONDS,
    }
}

/// Resolves the gateway that proxies `/userservice/*` into the user service
/// function.
///
/// ## Errors
/// Errs if there is no user service function.
pub fn resolve_gateway(
    ctx: &EnvironmentContext,
    functions: &FunctionSet,
    certificate: &Ref<Certificate>,
) -> Result<Gateway, ConfigError> {
    let from = qualified_id(Gateway::KIND, functions::USER_SERVICE);
    let target = functions.reference(&from, functions::USER_SERVICE)?;
    let cors = cors_policy(ctx);

    let route = Route {
        path_pattern: USER_SERVICE_ROUTE.to_owned(),
        target: target.clone(),
        methods: vec!["ANY".to_owned()],
    };
    let invoke_permission = InvokePermission {
        function: target,
        principal: "apigateway.amazonaws.com".to_owned(),
        action: "lambda:InvokeFunction".to_owned(),
        source_pattern: format!("*/*/{}/*", route.prefix()),
    };
    let gateway_responses = [
        (ResponseType::Default4xx, None, NOT_FOUND_TEMPLATE),
        (ResponseType::Unauthorized, Some(401), UNAUTHORIZED_TEMPLATE),
    ]
    .into_iter()
    .map(|(response_type, status_code, template)| GatewayResponse {
        response_type,
        status_code,
        template: template.to_owned(),
        headers: cors.response_headers(),
    })
    .collect();

    let gateway = Gateway {
        api_name: ctx.resource_name("UserServiceApi"),
        custom_domain: CustomDomain {
            domain_name: ctx.api_domain_name(),
            certificate: certificate.clone(),
            endpoint_type: EndpointType::Regional,
        },
        cors,
        routes: vec![route],
        gateway_responses,
        invoke_permissions: vec![invoke_permission],
        stage: StageOptions::default(),
    };
    gateway.validate(functions::USER_SERVICE)?;
    Ok(gateway)
}
