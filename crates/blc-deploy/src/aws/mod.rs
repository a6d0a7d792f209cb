//! Descriptors of AWS resources.
//!
//! Every descriptor here is provisioned by [`Synth`](crate::synth::Synth).
pub use aws_config::SdkConfig;

pub mod acm;
pub mod apigateway;
pub mod cloudfront;
pub mod dynamodb;
pub mod events;
pub mod iam;
pub mod lambda;
pub mod route53;
pub mod s3;
pub mod sqs;

/// What happens to a resource when it is removed from the deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RemovalPolicy {
    Retain,
    Destroy,
}

/// Loads the SDK config for the given region and named profile.
pub async fn load_config(region: &str, profile: &str) -> SdkConfig {
    log::debug!("loading aws config for profile '{profile}' in {region}");
    aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(region.to_owned()))
        .profile_name(profile)
        .load()
        .await
}
