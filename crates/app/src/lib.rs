//! Sample kord app: a busybox Deployment exposing `http` on port 80.

#![forbid(unsafe_code)]

use kord_core::{App, AppMeta, Backend, ContainerSpec, PortSpec, Result, WorkloadSpec};
use tracing::debug;

pub const RESOURCE_VERSION: &str = "v1.0.0";
const IMAGE: &str = "busybox";

pub struct SampleApp {
    meta: AppMeta,
    description: String,
    replicas: u32,
}

impl SampleApp {
    /// `example_label` lands in the `example-label` label; `replicas` may be zero.
    pub fn new(namespace: &str, name: &str, description: &str, example_label: &str, replicas: u32) -> Self {
        let meta = AppMeta::new(namespace, name)
            .with_resource_version(RESOURCE_VERSION)
            .with_labels([
                ("k8s-app", "sampleapp"),
                ("app", "sampleapp"),
                ("example-label", example_label),
                ("description", "short-description-of-your-app"),
            ])
            .with_annotation("beeps", "boops");
        Self { meta, description: description.to_string(), replicas }
    }

    pub fn workload(&self) -> WorkloadSpec {
        let container = ContainerSpec::new(self.meta.name(), IMAGE).with_port(PortSpec::tcp("http", 80));
        WorkloadSpec::for_app(&self.meta, self.replicas).with_container(container)
    }
}

#[async_trait::async_trait]
impl App for SampleApp {
    async fn install(&self, backend: &dyn Backend) -> Result<()> {
        let spec = self.workload();
        spec.validate(self.meta.namespace())?;
        debug!(app = %self.meta.id(), replicas = spec.replicas, "installing");
        backend
            .create_workload(self.meta.namespace(), &spec)
            .await
            .map_err(|e| e.for_app(self.meta.id()))
    }

    async fn uninstall(&self, backend: &dyn Backend) -> Result<()> {
        backend
            .delete_workload(self.meta.namespace(), self.meta.name())
            .await
            .map_err(|e| e.for_app(self.meta.id()))
    }

    fn meta(&self) -> &AppMeta { &self.meta }

    fn description(&self) -> &str { &self.description }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kord_core::memory::{Call, Fault, MemoryBackend};
    use kord_core::ErrorKind;

    fn app(replicas: u32) -> SampleApp {
        SampleApp::new("default", "simple-app", "a great app", "beeps-boops", replicas)
    }

    #[test]
    fn metadata_matches_construction() {
        let a = app(17);
        let m = a.meta();
        assert_eq!(m.namespace(), "default");
        assert_eq!(m.name(), "simple-app");
        assert_eq!(m.resource_version(), RESOURCE_VERSION);
        assert_eq!(m.labels().get("example-label").map(String::as_str), Some("beeps-boops"));
        assert_eq!(m.annotations().get("beeps").map(String::as_str), Some("boops"));
        assert_eq!(a.description(), "a great app");
    }

    #[test]
    fn workload_selector_is_subset_of_pod_labels() {
        let w = app(17).workload();
        assert_eq!(w.replicas, 17);
        assert!(w.selector.iter().all(|(k, v)| w.labels.get(k) == Some(v)));
        assert_eq!(w.containers[0].image, "busybox");
        assert_eq!(w.containers[0].name, "simple-app");
        assert_eq!(w.containers[0].ports[0].container_port, 80);
        assert!(w.validate("default").is_ok());
    }

    #[tokio::test]
    async fn install_twice_collides() {
        let b = MemoryBackend::new();
        let a = app(3);
        a.install(&b).await.unwrap();
        let err = a.install(&b).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(err.id(), a.meta().id());
        assert_eq!(b.workload("default", "simple-app").unwrap().replicas, 3);
    }

    #[tokio::test]
    async fn uninstall_twice_never_fails() {
        let b = MemoryBackend::new();
        let a = app(1);
        a.install(&b).await.unwrap();
        a.uninstall(&b).await.unwrap();
        a.uninstall(&b).await.unwrap();
        assert!(b.is_empty());
        // Uninstall of something never installed is fine too
        app(1).uninstall(&MemoryBackend::new()).await.unwrap();
    }

    #[tokio::test]
    async fn zero_replicas_are_installed_as_is() {
        let b = MemoryBackend::new();
        app(0).install(&b).await.unwrap();
        match &b.calls()[0] {
            Call::Create { spec, .. } => assert_eq!(spec.replicas, 0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn backend_outage_is_distinguishable() {
        let b = MemoryBackend::new();
        b.fail_on("simple-app", Fault::Unavailable);
        let err = app(1).install(&b).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
        let err = app(1).uninstall(&b).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    }
}
