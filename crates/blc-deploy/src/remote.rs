//! References between descriptors.
//!
//! A [`Ref`] names another descriptor by its logical name. It carries no
//! value of its own: the referenced descriptor's output only becomes
//! available once it has been provisioned, through [`Outputs`].

use std::{
    any::Any,
    collections::HashMap,
    marker::PhantomData,
    sync::{Arc, Mutex, PoisonError},
};

use snafu::OptionExt;

use crate::{Dependencies, Descriptor, DowncastSnafu, Error, HasDependencies, RemoteUnresolvedSnafu};

/// Returns the kind-qualified id of a descriptor, eg `table/holdings`.
pub fn qualified_id(kind: &str, name: &str) -> String {
    format!("{kind}/{name}")
}

/// A typed reference to a descriptor by logical name.
pub struct Ref<T> {
    name: String,
    _descriptor: PhantomData<fn() -> T>,
}

impl<T> Ref<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            _descriptor: PhantomData,
        }
    }

    /// The logical name of the referenced descriptor.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T: Descriptor> Ref<T> {
    /// The kind-qualified id of the referenced descriptor.
    pub fn id(&self) -> String {
        qualified_id(T::KIND, &self.name)
    }

    /// Returns the output of the referenced descriptor.
    ///
    /// ## Errors
    /// Errs if the referenced descriptor has not been provisioned.
    pub fn get(&self, outputs: &Outputs) -> Result<T::Output, Error> {
        outputs.get::<T::Output>(&self.id())
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self::new(self.name.clone())
    }
}

impl<T> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl<T> Eq for Ref<T> {}

impl<T> PartialOrd for Ref<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Ref<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}

impl<T> std::hash::Hash for Ref<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl<T> std::fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Ref").field(&self.name).finish()
    }
}

impl<T> serde::Serialize for Ref<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.name)
    }
}

impl<'de, T> serde::Deserialize<'de> for Ref<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(Ref::new(name))
    }
}

impl<T: Descriptor> HasDependencies for Ref<T> {
    fn dependencies(&self) -> Dependencies {
        Dependencies {
            inner: vec![self.id()],
        }
    }
}

#[derive(Debug)]
pub(crate) struct RemoteVar<T> {
    inner: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for RemoteVar<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone> RemoteVar<T> {
    pub fn get(&self) -> Option<T> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, value: Option<T>) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = value;
    }
}

pub(crate) struct Var {
    key: usize,
    kind: &'static str,
    ty: &'static str,
    remote: Box<dyn Any>,
}

/// Outputs of registered descriptors, keyed by kind-qualified id.
///
/// Every registered descriptor has an entry, which stays empty until the
/// descriptor is provisioned.
#[derive(Default)]
pub struct Outputs {
    vars: HashMap<String, Var>,
}

impl core::fmt::Display for Outputs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut vars = self.vars.iter().collect::<Vec<_>>();
        vars.sort_by_key(|(_, var)| var.key);
        for (id, var) in vars {
            f.write_fmt(format_args!(
                "id:'{id}' key:{key} kind:{kind} ty:{ty}\n",
                key = var.key,
                kind = var.kind,
                ty = var.ty,
            ))?;
        }
        Ok(())
    }
}

impl Outputs {
    /// Declares a new, unresolved output and returns it with its graph key.
    pub(crate) fn declare<T: Any>(&mut self, id: &str, kind: &'static str) -> (RemoteVar<T>, usize) {
        let key = self.vars.len();
        log::trace!(
            "declaring output '{id}' of type {} with key {key}",
            core::any::type_name::<T>()
        );
        let remote = RemoteVar::<T> {
            inner: Default::default(),
        };
        self.vars.insert(
            id.to_owned(),
            Var {
                key,
                kind,
                ty: core::any::type_name::<T>(),
                remote: Box::new(remote.clone()),
            },
        );
        (remote, key)
    }

    /// Returns the graph key of the given id.
    pub(crate) fn key(&self, id: &str) -> Option<usize> {
        self.vars.get(id).map(|var| var.key)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.vars.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Returns the output of the descriptor with the given id.
    ///
    /// ## Errors
    /// Errs if there is no such descriptor, if it has not been provisioned
    /// yet, or if its output is not of type `X`.
    pub fn get<X: Clone + 'static>(&self, id: &str) -> Result<X, Error> {
        let var = self
            .vars
            .get(id)
            .context(RemoteUnresolvedSnafu { depends_on: id })?;
        let remote = var
            .remote
            .downcast_ref::<RemoteVar<X>>()
            .context(DowncastSnafu {
                id,
                ty: core::any::type_name::<X>(),
            })?;
        remote.get().context(RemoteUnresolvedSnafu { depends_on: id })
    }
}
