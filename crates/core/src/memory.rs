//! In-memory backend. Records every call and behaves like a cluster that
//! never loses state: create collides on existing names, delete of a missing
//! workload is a no-op. Per-workload faults and delays can be injected.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::{Backend, BackendError, WorkloadSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create { namespace: String, spec: WorkloadSpec },
    Delete { namespace: String, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Unavailable,
    Other,
}

#[derive(Default)]
struct State {
    workloads: BTreeMap<(String, String), WorkloadSpec>,
    calls: Vec<Call>,
    faults: HashMap<String, Fault>,
    delays: HashMap<String, Duration>,
}

#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self { Self::default() }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every call against workload `name` fails with `fault` (the call is still recorded).
    pub fn fail_on(&self, name: &str, fault: Fault) {
        self.state().faults.insert(name.to_string(), fault);
    }

    pub fn clear_fault(&self, name: &str) {
        self.state().faults.remove(name);
    }

    /// Every call against workload `name` sleeps for `delay` first.
    pub fn delay_on(&self, name: &str, delay: Duration) {
        self.state().delays.insert(name.to_string(), delay);
    }

    pub fn calls(&self) -> Vec<Call> { self.state().calls.clone() }

    pub fn workload(&self, namespace: &str, name: &str) -> Option<WorkloadSpec> {
        self.state().workloads.get(&(namespace.to_string(), name.to_string())).cloned()
    }

    pub fn contains(&self, namespace: &str, name: &str) -> bool {
        self.workload(namespace, name).is_some()
    }

    pub fn len(&self) -> usize { self.state().workloads.len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    async fn enter(&self, name: &str, call: Call) -> Result<(), BackendError> {
        let (delay, fault) = {
            let mut st = self.state();
            st.calls.push(call);
            (st.delays.get(name).copied(), st.faults.get(name).copied())
        };
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        match fault {
            Some(Fault::Unavailable) => Err(BackendError::unavailable("injected: connection refused")),
            Some(Fault::Other) => Err(BackendError::Other(anyhow::anyhow!("injected failure for {}", name))),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl Backend for MemoryBackend {
    async fn create_workload(&self, namespace: &str, spec: &WorkloadSpec) -> Result<(), BackendError> {
        self.enter(&spec.name, Call::Create { namespace: namespace.to_string(), spec: spec.clone() }).await?;
        let key = (namespace.to_string(), spec.name.clone());
        let mut st = self.state();
        if st.workloads.contains_key(&key) {
            debug!(ns = %namespace, name = %spec.name, "memory backend: create collided");
            return Err(BackendError::AlreadyExists);
        }
        st.workloads.insert(key, spec.clone());
        Ok(())
    }

    async fn delete_workload(&self, namespace: &str, name: &str) -> Result<(), BackendError> {
        self.enter(name, Call::Delete { namespace: namespace.to_string(), name: name.to_string() }).await?;
        let removed = self.state().workloads.remove(&(namespace.to_string(), name.to_string()));
        if removed.is_none() {
            debug!(ns = %namespace, name = %name, "memory backend: delete of absent workload");
        }
        Ok(())
    }
}
