//! Alias records.
use crate::{
    aws::{
        apigateway::Gateway,
        route53::{AliasTarget, HostedZone, Record},
    },
    config::EnvironmentContext,
    remote::Ref,
};

pub const SERVICE_RECORD_TTL_SECONDS: u32 = 300;

/// Name of the environment's record, relative to the apex zone.
///
/// The empty string is the apex itself, used by production.
pub fn record_name(ctx: &EnvironmentContext) -> String {
    if ctx.is_production() {
        String::new()
    } else {
        ctx.name.clone()
    }
}

/// Resolves the alias record of the environment onto `target`.
pub fn resolve_dns(ctx: &EnvironmentContext, zone: &Ref<HostedZone>, target: AliasTarget) -> Record {
    Record {
        record_name: record_name(ctx),
        zone: zone.clone(),
        target,
        ttl_seconds: None,
    }
}

/// Resolves the record of the API's custom domain, `api` in production and
/// `api-{env}` otherwise.
pub fn resolve_service_dns(
    ctx: &EnvironmentContext,
    zone: &Ref<HostedZone>,
    gateway: &Ref<Gateway>,
) -> Record {
    let record_name = if ctx.is_production() {
        "api".to_owned()
    } else {
        format!("api-{}", ctx.name)
    };
    Record {
        record_name,
        zone: zone.clone(),
        target: AliasTarget::Gateway(gateway.clone()),
        ttl_seconds: Some(SERVICE_RECORD_TTL_SECONDS),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::EnvType;

    fn ctx(name: &str, env_type: EnvType) -> EnvironmentContext {
        EnvironmentContext::builder(name, env_type)
            .account("111")
            .region("us-east-1")
            .credential("x")
            .build()
            .unwrap()
    }

    #[test]
    fn production_records_the_apex() {
        for name in ["prd", "prod", "main"] {
            assert_eq!("", record_name(&ctx(name, EnvType::Prod)));
        }
        for name in ["dev", "stg", "feature-7"] {
            for env_type in [EnvType::Dev, EnvType::Staging] {
                assert_eq!(name, record_name(&ctx(name, env_type)));
            }
        }
    }

    #[test]
    fn service_records_match_the_api_domain() {
        let zone = Ref::new("apex");
        let gateway = Ref::new("user-service");
        for (name, env_type) in [("dev", EnvType::Dev), ("prd", EnvType::Prod)] {
            let ctx = ctx(name, env_type);
            let record = resolve_service_dns(&ctx, &zone, &gateway);
            assert_eq!(ctx.api_domain_name(), record.fqdn(ctx.apex()));
            assert_eq!(Some(300), record.ttl_seconds);
        }
    }

    #[test]
    fn dns_is_agnostic_about_its_target() {
        let ctx = ctx("dev", EnvType::Dev);
        let zone = Ref::new("apex");
        let site = resolve_dns(&ctx, &zone, AliasTarget::Distribution(Ref::new("site")));
        let api = resolve_dns(&ctx, &zone, AliasTarget::Gateway(Ref::new("user-service")));
        assert_eq!(site.record_name, api.record_name);
        assert_eq!("dev.baselayercapital.com", site.fqdn(ctx.apex()));
    }
}
