//! # blc-deploy
//!
//! Resolves the cloud resources of the Base Layer Capital web application
//! into immutable **descriptors**, one deployment per environment, and hands
//! them to a provisioning engine in dependency order.
//!
//! ## Concepts
//!
//! - **Descriptor**: a declarative record of the desired state of one
//!   resource (a table, a function, a gateway...). See [`Descriptor`].
//! - **Resolver**: a pure function from an
//!   [`EnvironmentContext`](config::EnvironmentContext) and earlier
//!   descriptors to new descriptors. The resolvers live in [`stack`].
//! - **Logical name**: a stable, human-assigned name used to reference a
//!   descriptor from another one via [`Ref`](remote::Ref). Logical names
//!   are namespaced by descriptor kind, so a table and a function may both
//!   be called `user-service`.
//! - **Output**: the values a provisioning engine assigns to a resource
//!   (ARNs, generated domain names). Downstream descriptors read them
//!   through their references once the upstream descriptor is provisioned.
//!
//! Resolved descriptors are registered into a [`Deployment`], which keeps
//! them in a DAG. Registering a descriptor before the descriptors it
//! references is an error, so a deployment can never be planned out of
//! order. [`Deployment::plan`] schedules the DAG into batches and
//! [`Deployment::apply`] provisions each batch, writing one manifest entry
//! per descriptor.
//!
//! ## Error Handling
//!
//! Two kinds of failures matter while resolving: [`ConfigError`] (missing
//! inputs, dangling references, invariant violations) and collaborator
//! lookup failures ([`Error::CollaboratorLookup`]). Both abort before
//! anything is handed to the provisioning engine.
use std::{future::Future, ops::Deref, pin::Pin};

use dagga::{Node, Schedule};
use snafu::prelude::*;
use tokio::io::AsyncWriteExt;

pub use blc_deploy_derive::HasDependencies;

extern crate self as deploy;

pub mod aws;
pub mod collaborator;
pub mod config;
mod has_dependencies_impl;
pub mod remote;
pub mod stack;
pub mod synth;
pub mod utils;

use remote::{Outputs, Ref, RemoteVar};

/// Marker trait for provisioning errors.
pub trait UserError: core::fmt::Display + core::fmt::Debug + 'static {}
impl<T: core::fmt::Display + core::fmt::Debug + 'static> UserError for T {}

/// A required input is missing, or the descriptors don't fit together.
#[derive(Snafu, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[snafu(display("Missing required input: {}", names.join(", ")))]
    MissingInputs { names: Vec<&'static str> },

    #[snafu(display("Unknown environment type '{value}', expected one of dev, staging, prd"))]
    UnknownEnvType { value: String },

    #[snafu(display("Environment name '{value}' is not a valid DNS label"))]
    InvalidEnvName { value: String },

    #[snafu(display("'{from}' references '{to}', which has not been resolved"))]
    DanglingReference { from: String, to: String },

    #[snafu(display("Logical name '{name}' is already in use"))]
    DuplicateName { name: String },

    #[snafu(display("'{name}' is invalid: {reason}"))]
    Invalid { name: String, reason: String },
}

/// Top-level error enum that encompasses all errors.
#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("{source}"))]
    Config { source: ConfigError },

    #[snafu(display("Could not find {what} '{key}': {reason}"))]
    CollaboratorLookup {
        what: &'static str,
        key: String,
        reason: String,
    },

    #[snafu(display("Could not read settings file {path:?}: {source}"))]
    SettingsRead {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Could not parse settings file {path:?}: {source}"))]
    SettingsParse {
        path: std::path::PathBuf,
        source: toml::de::Error,
    },

    #[snafu(display("Could not serialize '{name}': {source}"))]
    Serialize {
        name: String,
        source: serde_json::Error,
    },

    #[snafu(display("Could not create directory {path:?}: {source}"))]
    CreateDir {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Could not create file {path:?}: {source}"))]
    CreateFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Could not write file {path:?}: {source}"))]
    WriteFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Could not build schedule: {msg}"))]
    Schedule { msg: String },

    #[snafu(display("Output of '{depends_on}' is unresolved, it has not been provisioned yet"))]
    RemoteUnresolved { depends_on: String },

    #[snafu(display("Could not downcast the output of '{id}' to {ty}"))]
    Downcast { id: String, ty: &'static str },

    #[snafu(display("Error while provisioning '{name}': {error}"))]
    Provision {
        name: String,
        error: Box<dyn UserError>,
    },
}

impl From<ConfigError> for Error {
    fn from(source: ConfigError) -> Self {
        Error::Config { source }
    }
}

impl Error {
    /// Returns the configuration error, if this is one.
    pub fn as_config(&self) -> Option<&ConfigError> {
        match self {
            Error::Config { source } => Some(source),
            _ => None,
        }
    }

    pub fn is_collaborator_lookup(&self) -> bool {
        matches!(self, Error::CollaboratorLookup { .. })
    }
}

type Result<T, E = Error> = core::result::Result<T, E>;

/// A declarative description of one resource.
///
/// Descriptors are resolved once per deployment and never mutated. They
/// reference other descriptors through [`Ref`] fields, which report
/// themselves as dependencies via [`HasDependencies`].
pub trait Descriptor:
    core::fmt::Debug
    + Clone
    + PartialEq
    + HasDependencies
    + serde::Serialize
    + serde::de::DeserializeOwned
    + 'static
{
    /// Kind of resource, used to namespace logical names, eg `table`.
    const KIND: &'static str;

    /// Type of the provisioning engine.
    type Provider;

    /// Errors that may occur while provisioning.
    type Error: UserError;

    /// Values assigned by the provisioning engine.
    type Output: core::fmt::Debug
        + Clone
        + PartialEq
        + serde::Serialize
        + serde::de::DeserializeOwned
        + 'static;

    /// Checks the invariants of this descriptor.
    ///
    /// Called when the descriptor is registered in a [`Deployment`], before
    /// anything is scheduled.
    fn validate(&self, _name: &str) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Hands the descriptor to the provisioning engine.
    ///
    /// `outputs` holds the outputs of every descriptor provisioned so far,
    /// which always includes this descriptor's dependencies.
    fn provision(
        &self,
        provider: &Self::Provider,
        outputs: &Outputs,
    ) -> impl Future<Output = Result<Self::Output, Self::Error>>;
}

#[derive(Clone, Default, Debug, PartialEq)]
pub struct Dependencies {
    /// Kind-qualified ids of referenced descriptors.
    inner: Vec<String>,
}

impl IntoIterator for Dependencies {
    type Item = String;

    type IntoIter = <Vec<String> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl core::fmt::Display for Dependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.inner.join(", "))
    }
}

impl Dependencies {
    pub fn merge(self, other: Self) -> Self {
        let mut inner = self.inner;
        for id in other.inner {
            if !inner.contains(&id) {
                inner.push(id);
            }
        }
        Dependencies { inner }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.iter().any(|dep| dep == id)
    }
}

/// Tracks references between descriptors.
///
/// This trait can be derived, and has a default implementation that
/// reports zero dependencies.
pub trait HasDependencies {
    fn dependencies(&self) -> Dependencies {
        Dependencies::default()
    }
}

/// One resolved descriptor as handed to the provisioning engine.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    pub kind: String,
    pub name: String,
    pub descriptor: serde_json::Value,
    pub output: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl ManifestEntry {
    async fn save(&self, dir: impl AsRef<std::path::Path>) -> Result<()> {
        let path = dir
            .as_ref()
            .join(&self.kind)
            .join(format!("{}.json", self.name));
        log::debug!("writing {} to {path:?}", self.id);
        let contents = serde_json::to_string_pretty(self).context(SerializeSnafu {
            name: self.id.clone(),
        })?;
        write_file(&path, contents).await
    }
}

async fn write_file(path: &std::path::Path, contents: String) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context(CreateDirSnafu { path: parent })?;
    }
    let mut file = tokio::fs::File::create(path)
        .await
        .context(CreateFileSnafu { path })?;
    file.write_all(contents.as_bytes())
        .await
        .context(WriteFileSnafu { path })?;
    Ok(())
}

/// Every descriptor of an applied deployment, in provisioning order.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn get(&self, id: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.id.as_str())
    }
}

/// A descriptor that has been registered in a [`Deployment`].
#[derive(Clone, Debug)]
pub struct Registered<T> {
    reference: Ref<T>,
    descriptor: T,
}

impl<T> Deref for Registered<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.descriptor
    }
}

impl<T> Registered<T> {
    /// A reference to use in downstream descriptors.
    pub fn reference(&self) -> Ref<T> {
        self.reference.clone()
    }
}

type NodeRunFn<P> = Box<
    dyn for<'a> FnOnce(
        // Provisioning engine
        &'a P,
        // Outputs provisioned so far
        &'a Outputs,
    ) -> Pin<Box<dyn Future<Output = Result<ManifestEntry>> + 'a>>,
>;

fn node_run_fn<P, F>(f: F) -> NodeRunFn<P>
where
    F: for<'a> FnOnce(&'a P, &'a Outputs) -> Pin<Box<dyn Future<Output = Result<ManifestEntry>> + 'a>>
        + 'static,
{
    Box::new(f)
}

struct Provision<'a, P, T: Descriptor<Provider = P>> {
    provider: &'a P,
    outputs: &'a Outputs,
    id: String,
    name: String,
    descriptor: T,
    remote_var: RemoteVar<T::Output>,
}

impl<P, T: Descriptor<Provider = P>> Provision<'_, P, T> {
    async fn run(self) -> Result<ManifestEntry> {
        let Self {
            provider,
            outputs,
            id,
            name,
            descriptor,
            remote_var,
        } = self;
        log::info!("provision '{id}':");

        let output = descriptor
            .provision(provider, outputs)
            .await
            .map_err(|error| Error::Provision {
                name: id.clone(),
                error: Box::new(error),
            })?;
        remote_var.set(Some(output.clone()));

        let entry = ManifestEntry {
            id: id.clone(),
            kind: T::KIND.to_owned(),
            name,
            descriptor: serde_json::to_value(&descriptor).context(SerializeSnafu {
                name: format!("{id} descriptor"),
            })?,
            output: serde_json::to_value(&output).context(SerializeSnafu {
                name: format!("{id} output"),
            })?,
            dependencies: descriptor.dependencies().into_iter().collect(),
        };
        log::info!("  success!");
        Ok(entry)
    }
}

struct DeploymentNode<P> {
    id: String,
    kind: &'static str,
    dependencies: Vec<String>,
    run: NodeRunFn<P>,
}

/// One step of a [`Plan`].
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedStep {
    /// Kind-qualified id of the descriptor.
    pub id: String,
    pub kind: &'static str,
    pub dependencies: Vec<String>,
}

/// Batches of descriptors produced by [`Deployment::plan`].
///
/// Every descriptor in a batch only depends on descriptors of earlier
/// batches. Inspect the plan before passing it to [`Deployment::apply`].
pub struct Plan<P> {
    pub batches: Vec<Vec<PlannedStep>>,
    schedule: Schedule<Node<DeploymentNode<P>, usize>>,
}

impl<P> Plan<P> {
    pub fn len(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Index of the batch that contains the given id.
    pub fn batch_of(&self, id: &str) -> Option<usize> {
        self.batches
            .iter()
            .position(|batch| batch.iter().any(|step| step.id == id))
    }
}

impl<P> core::fmt::Display for Plan<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.batches.is_empty() {
            f.write_str("--- Nothing to deploy.\n")?;
        }
        for (i, batch) in self.batches.iter().enumerate() {
            let i = i + 1;
            writeln!(f, "--- step {i}")?;
            for step in batch.iter() {
                writeln!(f, "  {}", step.id)?;
            }
            f.write_str("---\n")?;
        }
        Ok(())
    }
}

/// A graph of registered descriptors, bound to a provisioning engine.
pub struct Deployment<P> {
    path: std::path::PathBuf,
    provider: P,
    outputs: Outputs,
    graph: dagga::Dag<DeploymentNode<P>, usize>,
}

impl<P: 'static> Deployment<P> {
    /// Creates an empty deployment that writes its manifest into `path`.
    pub fn new(path: impl AsRef<std::path::Path>, provider: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            provider,
            outputs: Outputs::default(),
            graph: dagga::Dag::default(),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Number of registered descriptors.
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Returns whether a descriptor with the given kind-qualified id has
    /// been registered.
    pub fn contains(&self, id: &str) -> bool {
        self.outputs.contains(id)
    }

    /// Registers a descriptor under a logical name.
    ///
    /// ## Errors
    /// Errs with a [`ConfigError`] if the descriptor is invalid, if the
    /// name is already taken for this kind, or if any descriptor it
    /// references has not been registered yet.
    pub fn register<T>(
        &mut self,
        name: impl AsRef<str>,
        descriptor: T,
    ) -> Result<Registered<T>, Error>
    where
        T: Descriptor<Provider = P>,
    {
        let name = name.as_ref();
        let reference = Ref::<T>::new(name);
        let id = reference.id();
        log::debug!("registering '{id}'");

        descriptor.validate(name)?;
        if self.outputs.contains(&id) {
            return Err(DuplicateNameSnafu { name: id }.build().into());
        }

        // Read the dependency keys, every dependency must already be known
        let mut dependencies = vec![];
        let mut reads = vec![];
        for dep in descriptor.dependencies() {
            let key = self.outputs.key(&dep).context(DanglingReferenceSnafu {
                from: id.clone(),
                to: dep.clone(),
            })?;
            reads.push(key);
            dependencies.push(dep);
        }

        let (remote_var, rez) = self.outputs.declare::<T::Output>(&id, T::KIND);

        let run = node_run_fn({
            let id = id.clone();
            let name = name.to_owned();
            let descriptor = descriptor.clone();
            move |provider: &P, outputs: &Outputs| {
                Box::pin(
                    Provision {
                        provider,
                        outputs,
                        id,
                        name,
                        descriptor,
                        remote_var,
                    }
                    .run(),
                )
            }
        });

        log::debug!("  with reads {reads:?} and result {rez}");
        let node = dagga::Node::new(DeploymentNode {
            id: id.clone(),
            kind: T::KIND,
            dependencies,
            run,
        })
        .with_name(id)
        .with_reads(reads)
        .with_result(rez);
        self.graph.add_node(node);

        Ok(Registered {
            reference,
            descriptor,
        })
    }

    /// Schedules every registered descriptor into dependency-ordered batches.
    ///
    /// The registered nodes move into the plan, so a deployment is planned
    /// once.
    pub fn plan(&mut self) -> Result<Plan<P>> {
        let graph = std::mem::take(&mut self.graph);
        let schedule = graph
            .build_schedule()
            .map_err(|e| Error::Schedule { msg: e.to_string() })?;
        let batches = schedule
            .batches
            .iter()
            .map(|batch| {
                batch
                    .iter()
                    .map(|node| {
                        let inner = node.inner();
                        PlannedStep {
                            id: inner.id.clone(),
                            kind: inner.kind,
                            dependencies: inner.dependencies.clone(),
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        Ok(Plan { batches, schedule })
    }

    /// Provisions a plan previously built by [`Deployment::plan`], writing
    /// one manifest entry per descriptor and a `manifest.json` listing them
    /// in provisioning order.
    pub async fn apply(&mut self, plan: Plan<P>) -> Result<Manifest> {
        let mut manifest = Manifest::default();
        for (i, batch) in plan.schedule.batches.into_iter().enumerate() {
            for (j, node) in batch.into_iter().enumerate() {
                log::debug!("applying node {j}, batch {i}");
                let deployment_node = node.into_inner();
                let entry = (deployment_node.run)(&self.provider, &self.outputs).await?;
                entry.save(&self.path).await?;
                manifest.entries.push(entry);
            }
        }

        let path = self.path.join("manifest.json");
        log::info!("writing manifest to {path:?}");
        let contents = serde_json::to_string_pretty(&manifest).context(SerializeSnafu {
            name: "manifest".to_owned(),
        })?;
        write_file(&path, contents).await?;
        Ok(manifest)
    }

    /// Outputs of everything provisioned so far.
    pub fn outputs(&self) -> &Outputs {
        &self.outputs
    }
}
