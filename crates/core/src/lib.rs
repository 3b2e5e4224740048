//! Kord core types: app identity, metadata, workload shape and the app contract.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

mod app;
mod error;
#[cfg(any(test, feature = "testkit"))]
pub mod memory;
pub mod workload;

pub use app::{App, Backend};
pub use error::{BackendError, Error, ErrorKind, Result};
pub use workload::{ContainerSpec, PortSpec, Protocol, WorkloadSpec, MAX_REPLICAS};

pub mod prelude {
    pub use super::{App, AppId, AppMeta, Backend, BackendError, Error, ErrorKind, WorkloadSpec};
}

/// Identity of a registered app. Unique within a registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AppId {
    pub namespace: String,
    pub name: String,
}

impl AppId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Identity plus descriptive metadata of an app.
///
/// Built once by the owning app through the `with_*` builders; afterwards only
/// read accessors exist, so a `&AppMeta` handed out by [`App::meta`] cannot be
/// used to change the app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMeta {
    id: AppId,
    /// Opaque stamp. Not used for optimistic concurrency.
    resource_version: String,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
}

impl AppMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: AppId::new(namespace, name),
            resource_version: String::new(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
        }
    }

    pub fn with_resource_version(mut self, rv: impl Into<String>) -> Self {
        self.resource_version = rv.into();
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_labels<I, K, V>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.labels.extend(labels.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> &AppId { &self.id }
    pub fn namespace(&self) -> &str { &self.id.namespace }
    pub fn name(&self) -> &str { &self.id.name }
    pub fn resource_version(&self) -> &str { &self.resource_version }
    pub fn labels(&self) -> &BTreeMap<String, String> { &self.labels }
    pub fn annotations(&self) -> &BTreeMap<String, String> { &self.annotations }

    /// True when every `(key, value)` of `selector` is present in the labels.
    pub fn matches_labels(&self, selector: &BTreeMap<String, String>) -> bool {
        selector.iter().all(|(k, v)| self.labels.get(k) == Some(v))
    }
}
