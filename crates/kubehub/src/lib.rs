//! Kord kubehub – cluster backend materializing workloads as apps/v1 Deployments

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, ContainerPort, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kord_core::{Backend, BackendError, ContainerSpec, WorkloadSpec};
use kube::{
    api::{Api, DeleteParams, PostParams},
    Client,
};
use metrics::counter;
use tracing::{debug, info};

/// Backend over a kube-rs client. One API request per call, no retries.
#[derive(Clone)]
pub struct KubeBackend {
    client: Client,
}

impl KubeBackend {
    pub fn new(client: Client) -> Self { Self { client } }

    /// Build a client from the local kubeconfig or the in-cluster environment.
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await.context("building kube client (kubeconfig or in-cluster)")?;
        Ok(Self::new(client))
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait::async_trait]
impl Backend for KubeBackend {
    async fn create_workload(&self, namespace: &str, spec: &WorkloadSpec) -> Result<(), BackendError> {
        let dep = to_deployment(spec)?;
        debug!(ns = %namespace, name = %spec.name, replicas = spec.replicas, "creating deployment");
        let res = create_outcome(self.deployments(namespace).create(&PostParams::default(), &dep).await);
        match &res {
            Ok(()) => {
                counter!("kube_create_ok", 1u64);
                info!(ns = %namespace, name = %spec.name, "deployment created");
            }
            Err(_) => counter!("kube_create_err", 1u64),
        }
        res
    }

    async fn delete_workload(&self, namespace: &str, name: &str) -> Result<(), BackendError> {
        match delete_outcome(self.deployments(namespace).delete(name, &DeleteParams::default()).await) {
            Ok(true) => {
                counter!("kube_delete_ok", 1u64);
                info!(ns = %namespace, name = %name, "deployment deleted");
                Ok(())
            }
            Ok(false) => {
                debug!(ns = %namespace, name = %name, "deployment already absent");
                Ok(())
            }
            Err(e) => {
                counter!("kube_delete_err", 1u64);
                Err(e)
            }
        }
    }
}

/// Result of a create request: a 409 conflict surfaces as [`BackendError::AlreadyExists`].
pub fn create_outcome<T>(res: Result<T, kube::Error>) -> Result<(), BackendError> {
    res.map(|_| ()).map_err(classify)
}

/// Result of a delete request: `Ok(true)` when removed, `Ok(false)` when already absent (404).
pub fn delete_outcome<T>(res: Result<T, kube::Error>) -> Result<bool, BackendError> {
    match res {
        Ok(_) => Ok(true),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(false),
        Err(e) => Err(classify(e)),
    }
}

/// Map a kube error onto the backend taxonomy.
pub fn classify(err: kube::Error) -> BackendError {
    match err {
        kube::Error::Api(ae) if ae.code == 409 => BackendError::AlreadyExists,
        kube::Error::Api(ae) if matches!(ae.code, 429 | 500 | 502 | 503 | 504) => {
            BackendError::Unavailable(format!("{} ({}): {}", ae.reason, ae.code, ae.message))
        }
        kube::Error::HyperError(e) => BackendError::Unavailable(e.to_string()),
        kube::Error::Service(e) => BackendError::Unavailable(e.to_string()),
        other => BackendError::Other(anyhow::Error::new(other)),
    }
}

fn non_empty(m: &BTreeMap<String, String>) -> Option<BTreeMap<String, String>> {
    if m.is_empty() { None } else { Some(m.clone()) }
}

fn to_container(c: &ContainerSpec) -> Container {
    let ports: Vec<ContainerPort> = c
        .ports
        .iter()
        .map(|p| ContainerPort {
            name: Some(p.name.clone()),
            protocol: Some(p.protocol.to_string()),
            container_port: i32::from(p.container_port),
            ..Default::default()
        })
        .collect();
    Container {
        name: c.name.clone(),
        image: Some(c.image.clone()),
        ports: if ports.is_empty() { None } else { Some(ports) },
        ..Default::default()
    }
}

/// Render a workload as an apps/v1 Deployment. `replicas` is always set, so a
/// zero-replica workload stays scaled to zero instead of picking up the server default.
/// A replica count outside the API's `int32` range is refused, never clamped.
pub fn to_deployment(spec: &WorkloadSpec) -> Result<Deployment, BackendError> {
    let replicas = i32::try_from(spec.replicas)
        .map_err(|_| BackendError::Other(anyhow!("replicas {} out of range for {}", spec.replicas, spec.name)))?;
    Ok(Deployment {
        metadata: ObjectMeta {
            name: Some(spec.name.clone()),
            labels: non_empty(&spec.labels),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector { match_labels: Some(spec.selector.clone()), ..Default::default() },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(spec.labels.clone()),
                    annotations: non_empty(&spec.annotations),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: spec.containers.iter().map(to_container).collect(),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}
