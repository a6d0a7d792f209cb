//! S3 buckets and static site deployments.
use snafu::prelude::*;

use super::{
    cloudfront::{Distribution, OriginAccessIdentity},
    RemovalPolicy,
};
use crate::{
    remote::{Outputs, Ref},
    synth::Synth,
    ConfigError, Descriptor, HasDependencies, InvalidSnafu,
};

/// A private bucket whose objects can only be read through an origin
/// access identity.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, HasDependencies)]
pub struct Bucket {
    pub bucket_name: String,
    #[dependencies(skip)]
    pub block_public_access: bool,
    #[dependencies(skip)]
    pub auto_delete_objects: bool,
    #[dependencies(skip)]
    pub removal_policy: RemovalPolicy,
    /// The only principal allowed to `s3:GetObject`.
    pub read_access: Ref<OriginAccessIdentity>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BucketOutput {
    pub arn: String,
    pub regional_domain_name: String,
    pub policy: serde_json::Value,
}

impl Descriptor for Bucket {
    const KIND: &'static str = "bucket";

    type Provider = Synth;
    type Error = crate::Error;
    type Output = BucketOutput;

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        ensure!(
            !self.bucket_name.is_empty() && self.bucket_name.len() <= 63,
            InvalidSnafu {
                name,
                reason: format!("'{}' is not a valid bucket name", self.bucket_name)
            }
        );
        ensure!(
            self.block_public_access,
            InvalidSnafu {
                name,
                reason: "buckets must block public access"
            }
        );
        ensure!(
            !self.auto_delete_objects || self.removal_policy == RemovalPolicy::Destroy,
            InvalidSnafu {
                name,
                reason: "auto deleting objects requires the destroy removal policy"
            }
        );
        Ok(())
    }

    async fn provision(&self, provider: &Synth, outputs: &Outputs) -> Result<BucketOutput, crate::Error> {
        let identity = self.read_access.get(outputs)?;
        let arn = Synth::global_arn("s3", &self.bucket_name);
        let policy = serde_json::json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Action": ["s3:GetObject"],
                "Resource": [format!("{arn}/*")],
                "Principal": {"CanonicalUser": identity.s3_canonical_user_id},
            }],
        });
        Ok(BucketOutput {
            regional_domain_name: format!(
                "{}.s3.{}.amazonaws.com",
                self.bucket_name, provider.region
            ),
            arn,
            policy,
        })
    }
}

/// Syncs a local directory into a bucket, then invalidates the
/// distribution in front of it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, HasDependencies)]
pub struct SiteDeployment {
    pub source: String,
    pub destination: Ref<Bucket>,
    pub distribution: Ref<Distribution>,
    #[dependencies(skip)]
    pub prune: bool,
    #[dependencies(skip)]
    pub memory_mb: u32,
    pub invalidation_paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SiteDeploymentOutput {
    pub destination_uri: String,
    pub distribution_id: String,
}

impl Descriptor for SiteDeployment {
    const KIND: &'static str = "site-deployment";

    type Provider = Synth;
    type Error = crate::Error;
    type Output = SiteDeploymentOutput;

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        ensure!(
            !self.source.is_empty(),
            InvalidSnafu {
                name,
                reason: "source directory is empty"
            }
        );
        ensure!(
            !self.invalidation_paths.is_empty()
                && self.invalidation_paths.iter().all(|path| path.starts_with('/')),
            InvalidSnafu {
                name,
                reason: "invalidation paths must be absolute"
            }
        );
        Ok(())
    }

    async fn provision(&self, _provider: &Synth, outputs: &Outputs) -> Result<SiteDeploymentOutput, crate::Error> {
        let distribution = self.distribution.get(outputs)?;
        let bucket = self.destination.get(outputs)?;
        let bucket_name = bucket.arn.trim_start_matches("arn:aws:s3:::");
        log::debug!(
            "  syncing {} to {bucket_name}, invalidating {:?}",
            self.source,
            self.invalidation_paths
        );
        Ok(SiteDeploymentOutput {
            destination_uri: format!("s3://{bucket_name}/"),
            distribution_id: distribution.distribution_id,
        })
    }
}
