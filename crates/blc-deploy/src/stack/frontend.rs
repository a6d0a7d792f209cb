//! The static frontend, served from a private bucket through CloudFront.
use crate::{
    aws::{
        acm::Certificate,
        cloudfront::{Distribution, ErrorResponse, OriginAccessIdentity, ViewerProtocolPolicy},
        s3::{Bucket, SiteDeployment},
        RemovalPolicy,
    },
    config::EnvironmentContext,
    remote::Ref,
};

/// Logical name shared by every frontend descriptor.
pub const SITE: &str = "site";

pub const FALLBACK_PAGE: &str = "/index.html";
pub const FALLBACK_TTL_SECONDS: u32 = 60;
pub const DEPLOYMENT_MEMORY_MB: u32 = 1024;

/// Every descriptor of the frontend.
#[derive(Debug, Clone, PartialEq)]
pub struct Frontend {
    pub origin_access_identity: OriginAccessIdentity,
    pub bucket: Bucket,
    pub distribution: Distribution,
    pub deployment: SiteDeployment,
}

/// Resolves the frontend of the environment, serving the built site at
/// `source` on the environment's domain.
pub fn resolve_frontend(
    ctx: &EnvironmentContext,
    source: &str,
    certificate: &Ref<Certificate>,
) -> Frontend {
    let domain_name = ctx.domain_name.clone();
    let origin_access_identity = OriginAccessIdentity {
        comment: ctx.resource_name("OAI"),
    };
    // Named `{env}.{base}` in every environment, production included
    let bucket = Bucket {
        bucket_name: format!("{}.{}", ctx.name, ctx.base_domain),
        block_public_access: true,
        auto_delete_objects: true,
        removal_policy: RemovalPolicy::Destroy,
        read_access: Ref::new(SITE),
    };
    let distribution = Distribution {
        aliases: vec![domain_name],
        certificate: certificate.clone(),
        origin: Ref::new(SITE),
        origin_access_identity: Ref::new(SITE),
        default_root_object: "index.html".to_owned(),
        viewer_protocol_policy: ViewerProtocolPolicy::RedirectToHttps,
        error_responses: [403, 404]
            .into_iter()
            .map(|status| ErrorResponse::fallback(status, FALLBACK_PAGE, FALLBACK_TTL_SECONDS))
            .collect(),
    };
    let deployment = SiteDeployment {
        source: source.to_owned(),
        destination: Ref::new(SITE),
        distribution: Ref::new(SITE),
        prune: true,
        memory_mb: DEPLOYMENT_MEMORY_MB,
        invalidation_paths: vec!["/*".to_owned()],
    };
    Frontend {
        origin_access_identity,
        bucket,
        distribution,
        deployment,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{config::EnvType, Descriptor};
    use pretty_assertions::assert_eq;

    fn frontend(name: &str, env_type: EnvType) -> Frontend {
        let ctx = EnvironmentContext::builder(name, env_type)
            .account("111")
            .region("us-east-1")
            .credential("x")
            .build()
            .unwrap();
        resolve_frontend(&ctx, "../frontend/dist", &Ref::new("domain"))
    }

    #[test]
    fn bucket_is_private_and_named_after_the_environment() {
        let dev = frontend("dev", EnvType::Dev);
        assert_eq!("dev.baselayercapital.com", dev.bucket.bucket_name);
        assert!(dev.bucket.block_public_access);
        assert!(dev.bucket.validate(SITE).is_ok());

        let prd = frontend("prd", EnvType::Prod);
        assert_eq!("prd.baselayercapital.com", prd.bucket.bucket_name);
        assert_eq!(vec!["baselayercapital.com".to_owned()], prd.distribution.aliases);
    }

    #[test]
    fn spa_fallback() {
        let frontend = frontend("dev", EnvType::Dev);
        assert_eq!(
            vec![
                ErrorResponse {
                    http_status: 403,
                    response_http_status: 200,
                    response_page_path: "/index.html".to_owned(),
                    ttl_seconds: 60,
                },
                ErrorResponse {
                    http_status: 404,
                    response_http_status: 200,
                    response_page_path: "/index.html".to_owned(),
                    ttl_seconds: 60,
                },
            ],
            frontend.distribution.error_responses
        );
        assert_eq!(
            ViewerProtocolPolicy::RedirectToHttps,
            frontend.distribution.viewer_protocol_policy
        );
        assert!(frontend.distribution.validate(SITE).is_ok());
    }

    #[test]
    fn deployment_invalidates_everything() {
        let deployment = frontend("dev", EnvType::Dev).deployment;
        assert_eq!(vec!["/*".to_owned()], deployment.invalidation_paths);
        assert!(deployment.prune);
        assert_eq!(1024, deployment.memory_mb);
    }
}
