use crate::{AppMeta, BackendError, Error, WorkloadSpec};

/// Cluster backend that materializes and destroys workloads.
///
/// Implementations perform a single attempt per call; retries are an operator
/// decision, never a backend one.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// Create `spec` in `namespace`. A workload with the same name must yield
    /// [`BackendError::AlreadyExists`] and leave the existing one untouched.
    async fn create_workload(&self, namespace: &str, spec: &WorkloadSpec) -> Result<(), BackendError>;

    /// Delete the named workload. Absence is success.
    async fn delete_workload(&self, namespace: &str, name: &str) -> Result<(), BackendError>;
}

/// A self-describing application: identity, metadata and lifecycle hooks.
///
/// `install` is collision-sensitive (a second install reports
/// [`Error::AlreadyExists`]); `uninstall` is idempotent.
#[async_trait::async_trait]
pub trait App: Send + Sync {
    async fn install(&self, backend: &dyn Backend) -> Result<(), Error>;
    async fn uninstall(&self, backend: &dyn Backend) -> Result<(), Error>;
    fn meta(&self) -> &AppMeta;
    fn description(&self) -> &str;
}
