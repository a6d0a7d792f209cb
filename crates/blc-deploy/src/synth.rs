//! The built-in provisioning engine.
//!
//! `Synth` doesn't call any cloud API. It computes the outputs a provider
//! would assign wherever they are deterministic (ARNs are a function of
//! account, region and name) and emits a token for everything else, eg the
//! generated domain name of a distribution. The resulting manifest is what
//! gets handed to an external provisioning engine.
use crate::config::EnvironmentContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synth {
    pub account: String,
    pub region: String,
}

impl Synth {
    pub fn new(ctx: &EnvironmentContext) -> Self {
        Self {
            account: ctx.account.clone(),
            region: ctx.region.clone(),
        }
    }

    /// A regional ARN, eg `arn:aws:dynamodb:us-east-1:111:table/dev-Holdings`.
    pub fn arn(&self, service: &str, resource: &str) -> String {
        format!("arn:aws:{service}:{}:{}:{resource}", self.region, self.account)
    }

    /// An ARN of a global service that is still scoped to the account, eg
    /// IAM or CloudFront.
    pub fn account_arn(&self, service: &str, resource: &str) -> String {
        format!("arn:aws:{service}::{}:{resource}", self.account)
    }

    /// An ARN without region or account, eg an S3 bucket.
    pub fn global_arn(service: &str, resource: &str) -> String {
        format!("arn:aws:{service}:::{resource}")
    }

    /// A placeholder for a value only the cloud provider can assign.
    pub fn token(id: &str, attribute: &str) -> String {
        format!("${{{id}.{attribute}}}")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arns() {
        let synth = Synth {
            account: "111".to_owned(),
            region: "us-east-1".to_owned(),
        };
        assert_eq!(
            "arn:aws:sqs:us-east-1:111:dev-IngestQueue",
            synth.arn("sqs", "dev-IngestQueue")
        );
        assert_eq!(
            "arn:aws:iam::111:role/dev-Role",
            synth.account_arn("iam", "role/dev-Role")
        );
        assert_eq!("arn:aws:s3:::bucket", Synth::global_arn("s3", "bucket"));
        assert_eq!(
            "${distribution/site.DomainName}",
            Synth::token("distribution/site", "DomainName")
        );
    }
}
