//! Kord dispatch: run `apply` or `delete` across a selection of registered apps.
//!
//! Apps are visited in registration order. A failing app never stops the
//! batch; every outcome lands in the returned [`AggregateResult`]. There is no
//! retry and no rollback across apps.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{stream, StreamExt};
use kord_core::{App, AppId, AppMeta, Backend, Error, Result};
use kord_registry::Registry;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

mod result;

pub use result::{AggregateError, AggregateResult, AppState, Outcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Apply,
    Delete,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self { Command::Apply => "apply", Command::Delete => "delete" })
    }
}

/// Which registered apps a command targets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    All,
    /// A single identity; a miss is [`Error::NotFound`].
    One(AppId),
    /// Apps carrying every given label. Matching nothing is not an error.
    Labels(BTreeMap<String, String>),
}

impl Selection {
    pub fn one(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Selection::One(AppId::new(namespace, name))
    }

    pub fn labels<I, K, V>(labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Selection::Labels(labels.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn matches(&self, meta: &AppMeta) -> bool {
        match self {
            Selection::All => true,
            Selection::One(id) => meta.id() == id,
            Selection::Labels(sel) => meta.matches_labels(sel),
        }
    }

    fn resolve(&self, registry: &Registry) -> Result<Vec<Arc<dyn App>>> {
        match self {
            Selection::One(id) => Ok(vec![registry.find(&id.namespace, &id.name)?]),
            _ => Ok(registry.all().iter().filter(|a| self.matches(a.meta())).cloned().collect()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Upper bound for a single install/uninstall call.
    pub call_timeout: Duration,
    /// Calls in flight at once. 1 means strictly sequential.
    pub concurrency: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { call_timeout: Duration::from_secs(30), concurrency: 1 }
    }
}

pub struct Dispatcher {
    backend: Arc<dyn Backend>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn Backend>, config: DispatchConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &DispatchConfig { &self.config }

    pub async fn apply(&self, registry: &Registry, selection: &Selection) -> Result<AggregateResult> {
        self.run(Command::Apply, registry, selection).await
    }

    pub async fn delete(&self, registry: &Registry, selection: &Selection) -> Result<AggregateResult> {
        self.run(Command::Delete, registry, selection).await
    }

    /// Run `command` over the selected apps. Only a targeted lookup miss is
    /// returned as `Err`; per-app failures are reported in the aggregate.
    pub async fn run(&self, command: Command, registry: &Registry, selection: &Selection) -> Result<AggregateResult> {
        let targets = selection.resolve(registry)?;
        let batch = Uuid::new_v4();
        let concurrency = self.config.concurrency.max(1);
        let span = info_span!("dispatch", %batch, %command);
        let agg = async move {
            info!(targets = targets.len(), concurrency, "dispatch started");
            // `buffered` starts calls in order and yields outcomes in order.
            let outcomes: Vec<Outcome> = stream::iter(targets)
                .map(|app| self.call(command, app))
                .buffered(concurrency)
                .collect()
                .await;
            let agg = AggregateResult { batch, command, outcomes };
            if agg.is_success() {
                info!(apps = agg.len(), "dispatch finished");
            } else {
                warn!(apps = agg.len(), failed = agg.failures().count(), "dispatch finished with failures");
            }
            agg
        }
        .instrument(span)
        .await;
        Ok(agg)
    }

    async fn call(&self, command: Command, app: Arc<dyn App>) -> Outcome {
        let id = app.meta().id().clone();
        let backend = self.backend.as_ref();
        let started = Instant::now();
        let fut = match command {
            Command::Apply => app.install(backend),
            Command::Delete => app.uninstall(backend),
        };
        let res = match tokio::time::timeout(self.config.call_timeout, fut).await {
            Ok(res) => res,
            Err(_) => {
                counter!("dispatch_timeout", 1u64);
                Err(Error::BackendUnavailable {
                    id: id.clone(),
                    reason: format!("timed out after {:?}", self.config.call_timeout),
                })
            }
        };
        let elapsed = started.elapsed();
        histogram!("dispatch_call_ms", elapsed.as_secs_f64() * 1000.0);
        let state = AppState::settle(command, res.is_ok());
        match res {
            Ok(()) => {
                counter!("dispatch_ok", 1u64);
                info!(app = %id, %state, elapsed_ms = elapsed.as_millis() as u64, "app done");
                Outcome { id, state, error: None, elapsed }
            }
            Err(e) => {
                counter!("dispatch_err", 1u64);
                warn!(app = %id, %state, kind = ?e.kind(), error = %e, "app failed");
                Outcome { id, state, error: Some(e), elapsed }
            }
        }
    }
}
