#![forbid(unsafe_code)]

use std::sync::Arc;

use clap::Parser;
use kord_core::memory::{Fault, MemoryBackend};
use kord_core::{App, AppMeta, Backend, ContainerSpec, Result, WorkloadSpec};
use kord_registry::Registry;
use kordctl::{execute, Cli};

struct Web {
    meta: AppMeta,
}

#[async_trait::async_trait]
impl App for Web {
    async fn install(&self, backend: &dyn Backend) -> Result<()> {
        let spec = WorkloadSpec::for_app(&self.meta, 1).with_container(ContainerSpec::new(self.meta.name(), "busybox"));
        spec.validate(self.meta.namespace())?;
        backend.create_workload(self.meta.namespace(), &spec).await.map_err(|e| e.for_app(self.meta.id()))
    }

    async fn uninstall(&self, backend: &dyn Backend) -> Result<()> {
        backend.delete_workload(self.meta.namespace(), self.meta.name()).await.map_err(|e| e.for_app(self.meta.id()))
    }

    fn meta(&self) -> &AppMeta { &self.meta }
    fn description(&self) -> &str { "serves the web" }
}

fn registry(names: &[&str]) -> Registry {
    let r = Registry::new();
    for n in names {
        let meta = AppMeta::new("default", *n)
            .with_resource_version("v1.0.0")
            .with_label("app", *n)
            .with_annotation("beeps", "boops");
        r.register(Web { meta }).unwrap();
    }
    r
}

struct Run {
    ok: bool,
    out: String,
    err: String,
}

async fn run(args: &[&str], registry: &Registry, backend: Option<Arc<dyn Backend>>) -> anyhow::Result<Run> {
    let cli = Cli::try_parse_from(std::iter::once("kordctl").chain(args.iter().copied()))?;
    let mut out = Vec::new();
    let mut err = Vec::new();
    let ok = execute(&cli, registry, backend, &mut out, &mut err).await?;
    Ok(Run { ok, out: String::from_utf8(out)?, err: String::from_utf8(err)? })
}

#[tokio::test]
async fn apply_then_reapply_reports_collision_on_stderr() {
    let reg = registry(&["web"]);
    let backend = Arc::new(MemoryBackend::new());

    let r = run(&["apply"], &reg, Some(backend.clone())).await.unwrap();
    assert!(r.ok);
    assert!(r.out.contains("installed"), "{}", r.out);
    assert!(r.out.contains("default/web"), "{}", r.out);
    assert!(r.err.is_empty());

    let r = run(&["apply"], &reg, Some(backend.clone())).await.unwrap();
    assert!(!r.ok);
    assert!(r.err.contains("error: already exists: default/web"), "{}", r.err);
    assert!(r.out.contains("apply: 0 succeeded, 1 failed"), "{}", r.out);
    assert!(!r.err.contains("hint:"), "collisions are not transient:\n{}", r.err);
}

#[tokio::test]
async fn delete_is_idempotent_from_the_cli() {
    let reg = registry(&["web"]);
    let backend = Arc::new(MemoryBackend::new());
    for _ in 0..2 {
        let r = run(&["delete", "--name", "web"], &reg, Some(backend.clone())).await.unwrap();
        assert!(r.ok, "{}", r.err);
    }
}

#[tokio::test]
async fn json_report_lists_every_outcome() {
    let reg = registry(&["a", "b", "c"]);
    let backend = Arc::new(MemoryBackend::new());
    backend.fail_on("b", Fault::Unavailable);

    let r = run(&["-o", "json", "apply"], &reg, Some(backend.clone())).await.unwrap();
    assert!(!r.ok);
    let v: serde_json::Value = serde_json::from_str(&r.out).unwrap();
    assert_eq!(v["command"], "apply");
    assert_eq!(v["success"], false);
    let outcomes = v["outcomes"].as_array().unwrap();
    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0]["state"], "installed");
    assert_eq!(outcomes[1]["state"], "install_failed");
    assert_eq!(outcomes[1]["error"]["kind"], "backend_unavailable");
    assert_eq!(outcomes[2]["state"], "installed");
    assert!(r.err.contains("default/b"), "{}", r.err);
    assert!(r.err.contains("hint: 1 failure(s) were transient"), "{}", r.err);
}

#[tokio::test]
async fn targeted_miss_is_an_error() {
    let reg = registry(&["web"]);
    let backend = Arc::new(MemoryBackend::new());
    let err = run(&["apply", "--name", "ghost"], &reg, Some(backend.clone())).await.err().unwrap();
    assert!(format!("{err:#}").contains("not found: default/ghost"), "{err:#}");
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn apply_without_backend_fails() {
    let reg = registry(&["web"]);
    assert!(run(&["apply"], &reg, None).await.is_err());
}

#[tokio::test]
async fn list_and_describe_work_offline() {
    let reg = registry(&["zeta", "alpha"]);
    let r = run(&["list"], &reg, None).await.unwrap();
    assert!(r.ok);
    let zeta = r.out.find("zeta").unwrap();
    let alpha = r.out.find("alpha").unwrap();
    assert!(zeta < alpha, "list must keep registration order:\n{}", r.out);
    assert!(r.out.contains("v1.0.0"));
    assert!(r.out.contains("serves the web"));

    let r = run(&["-o", "json", "describe", "--name", "alpha"], &reg, None).await.unwrap();
    let v: serde_json::Value = serde_json::from_str(&r.out).unwrap();
    assert_eq!(v["namespace"], "default");
    assert_eq!(v["labels"]["app"], "alpha");
    assert_eq!(v["annotations"]["beeps"], "boops");

    assert!(run(&["describe", "--ns", "default", "--name", "missing"], &reg, None).await.is_err());
}
