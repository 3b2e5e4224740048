use std::fmt;
use std::time::Duration;

use kord_core::{AppId, Error};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Command;

/// Terminal state of one app within one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    Installed,
    InstallFailed,
    Uninstalled,
    UninstallFailed,
}

impl AppState {
    pub(crate) fn settle(command: Command, ok: bool) -> Self {
        match (command, ok) {
            (Command::Apply, true) => AppState::Installed,
            (Command::Apply, false) => AppState::InstallFailed,
            (Command::Delete, true) => AppState::Uninstalled,
            (Command::Delete, false) => AppState::UninstallFailed,
        }
    }

    pub fn is_failure(self) -> bool {
        matches!(self, AppState::InstallFailed | AppState::UninstallFailed)
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppState::Installed => "installed",
            AppState::InstallFailed => "install failed",
            AppState::Uninstalled => "uninstalled",
            AppState::UninstallFailed => "uninstall failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct Outcome {
    pub id: AppId,
    pub state: AppState,
    /// Set exactly when `state` is a failure.
    pub error: Option<Error>,
    pub elapsed: Duration,
}

impl Outcome {
    pub fn is_success(&self) -> bool { self.error.is_none() }
}

/// Per-identity report of one batch, in registration order.
#[derive(Debug)]
pub struct AggregateResult {
    pub batch: Uuid,
    pub command: Command,
    pub outcomes: Vec<Outcome>,
}

impl AggregateResult {
    /// True only if every call succeeded. An empty selection is a success.
    pub fn is_success(&self) -> bool { self.outcomes.iter().all(Outcome::is_success) }

    pub fn succeeded(&self) -> impl Iterator<Item = &Outcome> + '_ {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &Outcome> + '_ {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn outcome(&self, id: &AppId) -> Option<&Outcome> {
        self.outcomes.iter().find(|o| &o.id == id)
    }

    pub fn len(&self) -> usize { self.outcomes.len() }
    pub fn is_empty(&self) -> bool { self.outcomes.is_empty() }

    pub fn into_result(self) -> Result<Self, AggregateError> {
        if self.is_success() {
            return Ok(self);
        }
        let total = self.outcomes.len();
        let failures = self.outcomes.into_iter().filter(|o| !o.is_success()).collect();
        Err(AggregateError { command: self.command, total, failures })
    }
}

impl fmt::Display for AggregateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.failures().count();
        write!(f, "{}: {} succeeded, {} failed", self.command, self.outcomes.len() - failed, failed)
    }
}

/// Every failure of a batch, not just the first.
#[derive(Debug, thiserror::Error)]
#[error("{command} failed for {} of {total} apps", .failures.len())]
pub struct AggregateError {
    pub command: Command,
    pub total: usize,
    pub failures: Vec<Outcome>,
}
