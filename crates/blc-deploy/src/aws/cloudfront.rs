//! CloudFront distributions.
use snafu::prelude::*;

use super::{acm::Certificate, s3::Bucket};
use crate::{
    remote::{Outputs, Ref},
    synth::Synth,
    ConfigError, Descriptor, HasDependencies, InvalidSnafu,
};

/// Hosted zone of every CloudFront distribution, used by alias records.
pub const CLOUDFRONT_HOSTED_ZONE_ID: &str = "Z2FDTNDATAQYW2";

/// Longest TTL of an error response. Longer TTLs keep serving a stale
/// fallback after a deploy.
pub const MAX_ERROR_TTL_SECONDS: u32 = 300;

/// An identity CloudFront uses to read from a private bucket.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OriginAccessIdentity {
    pub comment: String,
}

impl HasDependencies for OriginAccessIdentity {}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OriginAccessIdentityOutput {
    pub id: String,
    pub s3_canonical_user_id: String,
}

impl Descriptor for OriginAccessIdentity {
    const KIND: &'static str = "origin-access-identity";

    type Provider = Synth;
    type Error = crate::Error;
    type Output = OriginAccessIdentityOutput;

    async fn provision(
        &self,
        _provider: &Synth,
        _outputs: &Outputs,
    ) -> Result<OriginAccessIdentityOutput, crate::Error> {
        Ok(OriginAccessIdentityOutput {
            id: Synth::token(&self.comment, "OriginAccessIdentityId"),
            s3_canonical_user_id: Synth::token(&self.comment, "S3CanonicalUserId"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ViewerProtocolPolicy {
    AllowAll,
    RedirectToHttps,
    HttpsOnly,
}

/// Replaces an origin error with another response.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    pub http_status: u16,
    pub response_http_status: u16,
    pub response_page_path: String,
    pub ttl_seconds: u32,
}

impl ErrorResponse {
    /// Serves `page` with a 200 instead of `http_status`, so client side
    /// routes of a single page application resolve.
    pub fn fallback(http_status: u16, page: &str, ttl_seconds: u32) -> Self {
        Self {
            http_status,
            response_http_status: 200,
            response_page_path: page.to_owned(),
            ttl_seconds,
        }
    }
}

/// A distribution serving a private bucket through an access identity.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, HasDependencies)]
pub struct Distribution {
    pub aliases: Vec<String>,
    pub certificate: Ref<Certificate>,
    pub origin: Ref<Bucket>,
    pub origin_access_identity: Ref<OriginAccessIdentity>,
    pub default_root_object: String,
    #[dependencies(skip)]
    pub viewer_protocol_policy: ViewerProtocolPolicy,
    #[dependencies(skip)]
    pub error_responses: Vec<ErrorResponse>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DistributionOutput {
    pub distribution_id: String,
    pub arn: String,
    pub domain_name: String,
    pub hosted_zone_id: String,
}

impl Descriptor for Distribution {
    const KIND: &'static str = "distribution";

    type Provider = Synth;
    type Error = crate::Error;
    type Output = DistributionOutput;

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        ensure!(
            !self.aliases.is_empty(),
            InvalidSnafu {
                name,
                reason: "a distribution needs at least one alias"
            }
        );
        for (i, response) in self.error_responses.iter().enumerate() {
            ensure!(
                response.response_page_path.starts_with('/'),
                InvalidSnafu {
                    name,
                    reason: format!(
                        "error response page '{}' must be an absolute path",
                        response.response_page_path
                    )
                }
            );
            ensure!(
                response.ttl_seconds <= MAX_ERROR_TTL_SECONDS,
                InvalidSnafu {
                    name,
                    reason: format!(
                        "error response ttl {}s exceeds {MAX_ERROR_TTL_SECONDS}s",
                        response.ttl_seconds
                    )
                }
            );
            ensure!(
                !self.error_responses[..i]
                    .iter()
                    .any(|other| other.http_status == response.http_status),
                InvalidSnafu {
                    name,
                    reason: format!("status {} is remapped twice", response.http_status)
                }
            );
        }
        Ok(())
    }

    async fn provision(&self, provider: &Synth, outputs: &Outputs) -> Result<DistributionOutput, crate::Error> {
        let certificate = self.certificate.get(outputs)?;
        let bucket = self.origin.get(outputs)?;
        let identity = self.origin_access_identity.get(outputs)?;
        log::debug!(
            "  serving {} through {} with certificate {}",
            bucket.regional_domain_name,
            identity.id,
            certificate.arn
        );
        let key = self.aliases.join(",");
        let distribution_id = Synth::token(&key, "DistributionId");
        Ok(DistributionOutput {
            arn: provider.account_arn("cloudfront", &format!("distribution/{distribution_id}")),
            distribution_id,
            domain_name: Synth::token(&key, "DomainName"),
            hosted_zone_id: CLOUDFRONT_HOSTED_ZONE_ID.to_owned(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn distribution() -> Distribution {
        Distribution {
            aliases: vec!["dev.baselayercapital.com".to_owned()],
            certificate: Ref::new("wildcard"),
            origin: Ref::new("site"),
            origin_access_identity: Ref::new("site"),
            default_root_object: "index.html".to_owned(),
            viewer_protocol_policy: ViewerProtocolPolicy::RedirectToHttps,
            error_responses: vec![
                ErrorResponse::fallback(403, "/index.html", 60),
                ErrorResponse::fallback(404, "/index.html", 60),
            ],
        }
    }

    #[test]
    fn spa_fallback_is_valid() {
        assert!(distribution().validate("site").is_ok());
        let deps = distribution().dependencies();
        assert!(deps.contains("certificate/wildcard"));
        assert!(deps.contains("bucket/site"));
        assert!(deps.contains("origin-access-identity/site"));
    }

    #[test]
    fn long_error_ttls_are_invalid() {
        let mut d = distribution();
        d.error_responses[0].ttl_seconds = 3600;
        assert!(d.validate("site").is_err());
    }

    #[test]
    fn duplicate_remaps_are_invalid() {
        let mut d = distribution();
        d.error_responses[1].http_status = 403;
        assert!(d.validate("site").is_err());
    }
}
