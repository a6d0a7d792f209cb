//! AWS certificate manager.
//!
//! Certificates are issued outside of this deployment. They are looked up
//! by ARN and registered as imported descriptors.
use anyhow::Context;
use aws_config::SdkConfig;
use aws_sdk_acm::types::CertificateStatus;
use snafu::ensure;

use crate::{remote::Outputs, synth::Synth, ConfigError, Descriptor, HasDependencies, InvalidSnafu};

/// An existing TLS certificate.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Certificate {
    pub arn: String,
    /// Fully qualified domain name, may be a wildcard like `*.example.com`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_name: Option<String>,
}

impl HasDependencies for Certificate {}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CertificateOutput {
    pub arn: String,
}

impl Descriptor for Certificate {
    const KIND: &'static str = "certificate";

    type Provider = Synth;
    type Error = crate::Error;
    type Output = CertificateOutput;

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        ensure!(
            self.arn.starts_with("arn:aws:acm:"),
            InvalidSnafu {
                name,
                reason: format!("'{}' is not a certificate ARN", self.arn)
            }
        );
        Ok(())
    }

    async fn provision(&self, _provider: &Synth, _outputs: &Outputs) -> Result<CertificateOutput, crate::Error> {
        Ok(CertificateOutput {
            arn: self.arn.clone(),
        })
    }
}

/// Returns the region of an ARN, eg `us-east-1`.
pub fn arn_region(arn: &str) -> Option<&str> {
    arn.split(':').nth(3).filter(|region| !region.is_empty())
}

/// Describes the certificate with the given ARN, which must be issued.
///
/// ACM is regional, so the client targets the certificate's own region
/// instead of the region of `cfg`.
pub async fn describe_certificate(cfg: &SdkConfig, arn: &str) -> anyhow::Result<Certificate> {
    let region = arn_region(arn).context("certificate ARN has no region")?;
    log::debug!("describing certificate {arn} in {region}");
    let acm_cfg = aws_sdk_acm::config::Builder::from(cfg)
        .region(aws_sdk_acm::config::Region::new(region.to_owned()))
        .build();
    let client = aws_sdk_acm::Client::from_conf(acm_cfg);
    let out = client
        .describe_certificate()
        .certificate_arn(arn)
        .send()
        .await?;
    let detail = out.certificate.context("missing certificate detail")?;
    anyhow::ensure!(
        detail.status() == Some(&CertificateStatus::Issued),
        "certificate status is {:?}",
        detail.status()
    );
    Ok(Certificate {
        arn: detail.certificate_arn().unwrap_or(arn).to_owned(),
        domain_name: detail.domain_name().map(str::to_owned),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn region_comes_from_the_arn() {
        assert_eq!(
            Some("us-east-1"),
            arn_region(crate::config::DEFAULT_CERTIFICATE_ID)
        );
        assert_eq!(
            Some("eu-west-2"),
            arn_region("arn:aws:acm:eu-west-2:111:certificate/abc")
        );
        assert_eq!(None, arn_region("arn:aws:s3:::bucket"));
        assert_eq!(None, arn_region("not-an-arn"));
    }

    #[test]
    fn only_certificate_arns_are_valid() {
        let certificate = |arn: &str| Certificate {
            arn: arn.to_owned(),
            domain_name: None,
        };
        assert!(certificate(crate::config::DEFAULT_CERTIFICATE_ID)
            .validate("domain")
            .is_ok());
        assert!(certificate("arn:aws:s3:::bucket").validate("domain").is_err());
    }
}
