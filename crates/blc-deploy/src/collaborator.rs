//! Lookups of things that exist outside of the deployment.
//!
//! Certificates and hosted zones are managed elsewhere, and the shared layer
//! is bundled by an external pipeline. Resolvers only reference them, so the
//! composition root looks them up once through [`Collaborators`].
use std::{future::Future, path::Path};

use crate::{
    aws::{acm::Certificate, route53::HostedZone, SdkConfig},
    utils, Error,
};

/// A bundled dependency layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerBundle {
    pub entry: String,
    pub requirements: String,
    /// Digest of the requirements manifest, `None` if it can't be found.
    pub content_hash: Option<String>,
}

/// Read-only lookups consumed by the composition root.
pub trait Collaborators {
    /// Looks up a certificate by its identifier.
    fn certificate(&self, id: &str) -> impl Future<Output = Result<Certificate, Error>>;

    /// Looks up the hosted zone of an apex domain.
    fn hosted_zone(&self, apex: &str) -> impl Future<Output = Result<HostedZone, Error>>;

    /// Returns the bundle of the layer at `entry`.
    fn layer_bundle(&self, entry: &Path) -> impl Future<Output = Result<LayerBundle, Error>>;
}

fn lookup_error(what: &'static str, key: &str, reason: impl core::fmt::Display) -> Error {
    Error::CollaboratorLookup {
        what,
        key: key.to_owned(),
        reason: reason.to_string(),
    }
}

/// Fingerprints the requirements manifest of the layer at `entry`.
pub fn bundle_layer(entry: &Path) -> Result<LayerBundle, Error> {
    let requirements = entry.join("requirements.txt");
    let content_hash = utils::sha256_digest(&requirements)
        .map_err(|e| lookup_error("layer bundle", &requirements.display().to_string(), e))?;
    if content_hash.is_none() {
        log::warn!(
            "{} does not exist, the layer will not be fingerprinted",
            requirements.display()
        );
    }
    Ok(LayerBundle {
        entry: entry.display().to_string(),
        requirements: requirements.display().to_string(),
        content_hash,
    })
}

/// Answers lookups from settings, without any network access.
#[derive(Debug, Default, Clone)]
pub struct StaticCollaborators {
    pub hosted_zone_id: Option<String>,
}

impl Collaborators for StaticCollaborators {
    async fn certificate(&self, id: &str) -> Result<Certificate, Error> {
        Ok(Certificate {
            arn: id.to_owned(),
            domain_name: None,
        })
    }

    async fn hosted_zone(&self, apex: &str) -> Result<HostedZone, Error> {
        let zone_id = self
            .hosted_zone_id
            .clone()
            .ok_or_else(|| lookup_error("hosted zone", apex, "no hosted_zone_id in settings"))?;
        Ok(HostedZone {
            zone_id,
            zone_name: apex.to_owned(),
        })
    }

    async fn layer_bundle(&self, entry: &Path) -> Result<LayerBundle, Error> {
        bundle_layer(entry)
    }
}

/// Answers lookups with ACM and Route53.
pub struct AwsCollaborators {
    cfg: SdkConfig,
}

impl AwsCollaborators {
    pub fn new(cfg: SdkConfig) -> Self {
        Self { cfg }
    }
}

impl Collaborators for AwsCollaborators {
    async fn certificate(&self, id: &str) -> Result<Certificate, Error> {
        crate::aws::acm::describe_certificate(&self.cfg, id)
            .await
            .map_err(|e| lookup_error("certificate", id, format!("{e:#}")))
    }

    async fn hosted_zone(&self, apex: &str) -> Result<HostedZone, Error> {
        crate::aws::route53::lookup_hosted_zone(&self.cfg, apex)
            .await
            .map_err(|e| lookup_error("hosted zone", apex, format!("{e:#}")))
    }

    async fn layer_bundle(&self, entry: &Path) -> Result<LayerBundle, Error> {
        bundle_layer(entry)
    }
}
