//! Resolvers, and the composition root that runs them in order.
//!
//! Resolution runs environment context, lookups, layer, tables, queue,
//! functions, triggers, gateway and DNS, in that order. The frontend only
//! depends on the context and the certificate.
use std::path::Path;

use crate::{
    aws::{
        acm::Certificate,
        apigateway::Gateway,
        events::Trigger,
        lambda::Layer,
        route53::{AliasTarget, HostedZone, Record},
        sqs::Queue,
    },
    collaborator::Collaborators,
    config::{self, EnvironmentContext, RawInputs, Settings},
    remote::Ref,
    synth::Synth,
    Deployment, Error,
};

pub mod dns;
pub mod frontend;
pub mod functions;
pub mod gateway;
pub mod tables;
pub mod triggers;

pub use functions::FunctionSet;
pub use tables::TableSet;

/// Logical names of the descriptors that aren't part of a set.
pub const CERTIFICATE: &str = "domain";
pub const HOSTED_ZONE: &str = "apex";
pub const LAYER: &str = "common";
pub const QUEUE: &str = "ingest";
pub const GATEWAY: &str = "user-service";
pub const SITE_RECORD: &str = "site";
pub const API_RECORD: &str = "api";

/// Every descriptor of one environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub ctx: EnvironmentContext,
    pub certificate: Certificate,
    pub hosted_zone: HostedZone,
    pub layer: Layer,
    pub tables: TableSet,
    pub queue: Queue,
    pub functions: FunctionSet,
    pub triggers: Vec<(String, Trigger)>,
    pub gateway: Gateway,
    pub frontend: frontend::Frontend,
    pub site_record: Record,
    pub api_record: Record,
}

/// Resolves every descriptor of the environment described by `inputs`.
///
/// The environment context is resolved before any lookup, so missing
/// inputs never reach a collaborator.
pub async fn resolve(
    inputs: &RawInputs,
    settings: &Settings,
    collaborators: &impl Collaborators,
) -> Result<Resolved, Error> {
    let ctx = config::resolve(inputs, settings)?;

    let certificate = collaborators.certificate(&ctx.certificate_id).await?;
    let hosted_zone = collaborators.hosted_zone(ctx.apex()).await?;
    let bundle = collaborators.layer_bundle(&settings.layer_entry).await?;

    let layer = functions::resolve_layer(&ctx, &bundle);
    let tables = tables::resolve_tables(&ctx);
    let queue = functions::resolve_queue(&ctx);
    let functions = functions::resolve_functions(&ctx, &tables, &Ref::new(LAYER))?;
    let triggers = triggers::resolve_triggers(&ctx, &functions, (QUEUE, &queue))?;
    let certificate_ref = Ref::new(CERTIFICATE);
    let gateway = gateway::resolve_gateway(&ctx, &functions, &certificate_ref)?;
    let zone = Ref::new(HOSTED_ZONE);
    let api_record = dns::resolve_service_dns(&ctx, &zone, &Ref::new(GATEWAY));
    let frontend = frontend::resolve_frontend(
        &ctx,
        &settings.frontend_dist.display().to_string(),
        &certificate_ref,
    );
    let site_record = dns::resolve_dns(
        &ctx,
        &zone,
        AliasTarget::Distribution(Ref::new(frontend::SITE)),
    );

    Ok(Resolved {
        ctx,
        certificate,
        hosted_zone,
        layer,
        tables,
        queue,
        functions,
        triggers,
        gateway,
        frontend,
        site_record,
        api_record,
    })
}

impl Resolved {
    /// Registers every descriptor, upstream first.
    pub fn register(&self, deployment: &mut Deployment<Synth>) -> Result<(), Error> {
        deployment.register(CERTIFICATE, self.certificate.clone())?;
        deployment.register(HOSTED_ZONE, self.hosted_zone.clone())?;
        deployment.register(LAYER, self.layer.clone())?;
        for (name, table) in self.tables.iter() {
            deployment.register(name, table.clone())?;
        }
        deployment.register(QUEUE, self.queue.clone())?;
        for (name, function) in self.functions.iter() {
            deployment.register(name, function.clone())?;
        }
        for (name, trigger) in self.triggers.iter() {
            deployment.register(name, trigger.clone())?;
        }
        deployment.register(GATEWAY, self.gateway.clone())?;
        deployment.register(API_RECORD, self.api_record.clone())?;

        let frontend = &self.frontend;
        deployment.register(frontend::SITE, frontend.origin_access_identity.clone())?;
        deployment.register(frontend::SITE, frontend.bucket.clone())?;
        deployment.register(frontend::SITE, frontend.distribution.clone())?;
        deployment.register(frontend::SITE, frontend.deployment.clone())?;
        deployment.register(SITE_RECORD, self.site_record.clone())?;
        log::info!(
            "registered {} descriptors for '{}'",
            deployment.len(),
            self.ctx.name
        );
        Ok(())
    }
}

/// Resolves the environment and registers it into a new deployment that
/// writes its manifest into `out_dir`.
pub async fn compose(
    inputs: &RawInputs,
    settings: &Settings,
    collaborators: &impl Collaborators,
    out_dir: impl AsRef<Path>,
) -> Result<(Resolved, Deployment<Synth>), Error> {
    let resolved = resolve(inputs, settings, collaborators).await?;
    let mut deployment = Deployment::new(out_dir, Synth::new(&resolved.ctx));
    resolved.register(&mut deployment)?;
    Ok((resolved, deployment))
}
