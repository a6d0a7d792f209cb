//! Route53 hosted zones and alias records.
use anyhow::Context;
use aws_config::SdkConfig;
use snafu::ensure;

use super::{apigateway::Gateway, cloudfront::Distribution};
use crate::{
    remote::{Outputs, Ref},
    synth::Synth,
    ConfigError, Dependencies, Descriptor, HasDependencies, InvalidSnafu,
};

/// An existing hosted zone.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HostedZone {
    pub zone_id: String,
    /// Apex domain of the zone, without the trailing dot.
    pub zone_name: String,
}

impl HasDependencies for HostedZone {}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HostedZoneOutput {
    pub zone_id: String,
    pub zone_name: String,
}

impl Descriptor for HostedZone {
    const KIND: &'static str = "hosted-zone";

    type Provider = Synth;
    type Error = crate::Error;
    type Output = HostedZoneOutput;

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        ensure!(
            !self.zone_id.is_empty() && !self.zone_name.is_empty(),
            InvalidSnafu {
                name,
                reason: "hosted zone needs an id and a name"
            }
        );
        Ok(())
    }

    async fn provision(&self, _provider: &Synth, _outputs: &Outputs) -> Result<HostedZoneOutput, crate::Error> {
        Ok(HostedZoneOutput {
            zone_id: self.zone_id.clone(),
            zone_name: self.zone_name.clone(),
        })
    }
}

/// Looks up the public hosted zone of an apex domain.
pub async fn lookup_hosted_zone(cfg: &SdkConfig, domain: &str) -> anyhow::Result<HostedZone> {
    log::debug!("looking up hosted zone of {domain}");
    let client = aws_sdk_route53::Client::new(cfg);
    let out = client
        .list_hosted_zones_by_name()
        .dns_name(domain)
        .max_items(1)
        .send()
        .await?;
    let wanted = format!("{}.", domain.trim_end_matches('.'));
    let zone = out
        .hosted_zones()
        .iter()
        .find(|zone| zone.name() == wanted)
        .context("no hosted zone matches")?;
    Ok(HostedZone {
        zone_id: zone.id().trim_start_matches("/hostedzone/").to_owned(),
        zone_name: wanted.trim_end_matches('.').to_owned(),
    })
}

/// The domain an alias record points at.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasTarget {
    /// The custom domain of a gateway.
    Gateway(Ref<Gateway>),
    Distribution(Ref<Distribution>),
}

impl HasDependencies for AliasTarget {
    fn dependencies(&self) -> Dependencies {
        match self {
            AliasTarget::Gateway(gateway) => gateway.dependencies(),
            AliasTarget::Distribution(distribution) => distribution.dependencies(),
        }
    }
}

/// An `A` alias record.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, HasDependencies)]
pub struct Record {
    /// Name relative to the zone, the empty string is the zone apex.
    pub record_name: String,
    pub zone: Ref<HostedZone>,
    pub target: AliasTarget,
    #[dependencies(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u32>,
}

impl Record {
    /// The fully qualified name of this record within `zone_name`.
    pub fn fqdn(&self, zone_name: &str) -> String {
        if self.record_name.is_empty() {
            zone_name.to_owned()
        } else {
            format!("{}.{zone_name}", self.record_name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RecordOutput {
    pub fqdn: String,
    pub alias_dns_name: String,
    pub alias_hosted_zone_id: String,
}

impl Descriptor for Record {
    const KIND: &'static str = "record";

    type Provider = Synth;
    type Error = crate::Error;
    type Output = RecordOutput;

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        ensure!(
            self.record_name.is_empty() || crate::utils::is_dns_label(&self.record_name),
            InvalidSnafu {
                name,
                reason: format!("record name '{}' is not a DNS label", self.record_name)
            }
        );
        Ok(())
    }

    async fn provision(&self, _provider: &Synth, outputs: &Outputs) -> Result<RecordOutput, crate::Error> {
        let zone = self.zone.get(outputs)?;
        let (alias_dns_name, alias_hosted_zone_id) = match &self.target {
            AliasTarget::Gateway(gateway) => {
                let gateway = gateway.get(outputs)?;
                (
                    gateway.custom_domain.regional_domain_name,
                    gateway.custom_domain.regional_hosted_zone_id,
                )
            }
            AliasTarget::Distribution(distribution) => {
                let distribution = distribution.get(outputs)?;
                (distribution.domain_name, distribution.hosted_zone_id)
            }
        };
        let fqdn = self.fqdn(&zone.zone_name);
        log::debug!("  {fqdn} -> {alias_dns_name}");
        Ok(RecordOutput {
            fqdn,
            alias_dns_name,
            alias_hosted_zone_id,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn apex_records() {
        let mut record = Record {
            record_name: String::new(),
            zone: Ref::new("apex"),
            target: AliasTarget::Distribution(Ref::new("site")),
            ttl_seconds: None,
        };
        assert_eq!("baselayercapital.com", record.fqdn("baselayercapital.com"));
        assert!(record.validate("site").is_ok());

        record.record_name = "dev".to_owned();
        assert_eq!("dev.baselayercapital.com", record.fqdn("baselayercapital.com"));

        let deps = record.dependencies();
        assert!(deps.contains("hosted-zone/apex"));
        assert!(deps.contains("distribution/site"));
    }
}
