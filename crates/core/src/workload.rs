//! Backend-neutral shape of the workload an app materializes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{AppId, AppMeta, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    Sctp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Sctp => "SCTP",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    pub name: String,
    pub protocol: Protocol,
    pub container_port: u16,
}

impl PortSpec {
    pub fn tcp(name: impl Into<String>, port: u16) -> Self {
        Self { name: name.into(), protocol: Protocol::Tcp, container_port: port }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub ports: Vec<PortSpec>,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self { name: name.into(), image: image.into(), ports: Vec::new() }
    }

    pub fn with_port(mut self, port: PortSpec) -> Self {
        self.ports.push(port);
        self
    }
}

/// Largest replica count a cluster accepts (the API field is a signed 32-bit int).
pub const MAX_REPLICAS: u32 = i32::MAX as u32;

/// Replicated set of pods selected by label.
///
/// `selector` must be a literal subset of `labels`; [`WorkloadSpec::validate`]
/// checks it before anything reaches a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub name: String,
    /// Zero is a legal scaled-down workload; at most [`MAX_REPLICAS`].
    pub replicas: u32,
    pub selector: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub containers: Vec<ContainerSpec>,
}

impl WorkloadSpec {
    /// Workload named after the app, selecting and labelling pods with the app labels.
    pub fn for_app(meta: &AppMeta, replicas: u32) -> Self {
        Self {
            name: meta.name().to_string(),
            replicas,
            selector: meta.labels().clone(),
            labels: meta.labels().clone(),
            annotations: BTreeMap::new(),
            containers: Vec::new(),
        }
    }

    pub fn with_container(mut self, container: ContainerSpec) -> Self {
        self.containers.push(container);
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self, namespace: &str) -> Result<(), Error> {
        let invalid = |reason: String| Error::InvalidWorkload { id: AppId::new(namespace, &self.name), reason };
        if self.name.is_empty() {
            return Err(invalid("workload name is empty".into()));
        }
        if self.replicas > MAX_REPLICAS {
            return Err(invalid(format!("replicas {} exceeds {MAX_REPLICAS}", self.replicas)));
        }
        if self.selector.is_empty() {
            return Err(invalid("selector is empty".into()));
        }
        for (k, v) in &self.selector {
            match self.labels.get(k) {
                Some(l) if l == v => {}
                Some(l) => return Err(invalid(format!("selector {k}={v} does not match pod label {k}={l}"))),
                None => return Err(invalid(format!("selector key {k} is missing from pod labels"))),
            }
        }
        if self.containers.is_empty() {
            return Err(invalid("no containers".into()));
        }
        Ok(())
    }
}
