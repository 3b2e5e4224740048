use serde::{Deserialize, Serialize};

use crate::AppId;

/// Errors surfaced by registration, lookup and the app lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Registration-time misconfiguration; fatal to startup.
    #[error("duplicate identity: {0} is already registered")]
    DuplicateIdentity(AppId),
    #[error("not found: {0}")]
    NotFound(AppId),
    #[error("already exists: {0}")]
    AlreadyExists(AppId),
    #[error("backend unavailable for {id}: {reason}")]
    BackendUnavailable { id: AppId, reason: String },
    #[error("invalid workload for {id}: {reason}")]
    InvalidWorkload { id: AppId, reason: String },
    #[error("{id}: {source}")]
    Other {
        id: AppId,
        #[source]
        source: anyhow::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Payload-free discriminant of [`Error`], used for reports and matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DuplicateIdentity,
    NotFound,
    AlreadyExists,
    BackendUnavailable,
    InvalidWorkload,
    Other,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DuplicateIdentity(_) => ErrorKind::DuplicateIdentity,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::BackendUnavailable { .. } => ErrorKind::BackendUnavailable,
            Error::InvalidWorkload { .. } => ErrorKind::InvalidWorkload,
            Error::Other { .. } => ErrorKind::Other,
        }
    }

    /// Identity this error is about.
    pub fn id(&self) -> &AppId {
        match self {
            Error::DuplicateIdentity(id) | Error::NotFound(id) | Error::AlreadyExists(id) => id,
            Error::BackendUnavailable { id, .. } | Error::InvalidWorkload { id, .. } | Error::Other { id, .. } => id,
        }
    }

    /// Transient failures an operator may retry by re-running the command.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::BackendUnavailable { .. })
    }
}

/// Failure reported by a cluster backend. Carries no identity; apps attach
/// theirs with [`BackendError::for_app`].
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("already exists")]
    AlreadyExists,
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BackendError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    pub fn for_app(self, id: &AppId) -> Error {
        match self {
            BackendError::AlreadyExists => Error::AlreadyExists(id.clone()),
            BackendError::Unavailable(reason) => Error::BackendUnavailable { id: id.clone(), reason },
            BackendError::Other(source) => Error::Other { id: id.clone(), source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn web() -> AppId { AppId::new("default", "web") }

    #[test]
    fn backend_errors_map_to_identity_errors() {
        let e = BackendError::AlreadyExists.for_app(&web());
        assert_eq!(e.kind(), ErrorKind::AlreadyExists);
        assert_eq!(e.id(), &web());

        let e = BackendError::unavailable("connection refused").for_app(&web());
        assert_eq!(e.kind(), ErrorKind::BackendUnavailable);
        assert!(e.is_transient());
        assert!(e.to_string().contains("default/web"));
        assert!(e.to_string().contains("connection refused"));
    }

    #[test]
    fn other_keeps_backend_message_verbatim() {
        let e = BackendError::from(anyhow::anyhow!("admission webhook denied the request")).for_app(&web());
        assert_eq!(e.kind(), ErrorKind::Other);
        assert!(!e.is_transient());
        assert_eq!(e.to_string(), "default/web: admission webhook denied the request");
    }

    #[test]
    fn duplicate_identity_names_the_identity() {
        let e = Error::DuplicateIdentity(web());
        assert!(e.to_string().contains("default/web"));
        assert_eq!(e.kind(), ErrorKind::DuplicateIdentity);
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let s = serde_json::to_string(&ErrorKind::BackendUnavailable).unwrap();
        assert_eq!(s, "\"backend_unavailable\"");
    }
}
