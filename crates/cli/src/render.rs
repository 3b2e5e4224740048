//! Human and JSON renderings of registry listings and batch reports.

use std::collections::BTreeMap;
use std::io::Write;

use anyhow::Result;
use kord_core::{App, ErrorKind};
use kord_dispatch::{AggregateResult, AppState, Command};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct OutcomeReport {
    pub namespace: String,
    pub name: String,
    pub state: AppState,
    pub elapsed_ms: u64,
    pub error: Option<ErrorReport>,
}

/// Serializable form of an [`AggregateResult`].
#[derive(Debug, Serialize)]
pub struct Report {
    pub batch: Uuid,
    pub command: Command,
    pub success: bool,
    pub finished_at: String,
    pub outcomes: Vec<OutcomeReport>,
}

impl From<&AggregateResult> for Report {
    fn from(agg: &AggregateResult) -> Self {
        let outcomes = agg
            .outcomes
            .iter()
            .map(|o| OutcomeReport {
                namespace: o.id.namespace.clone(),
                name: o.id.name.clone(),
                state: o.state,
                elapsed_ms: o.elapsed.as_millis() as u64,
                error: o.error.as_ref().map(|e| ErrorReport { kind: e.kind(), message: e.to_string() }),
            })
            .collect();
        Report {
            batch: agg.batch,
            command: agg.command,
            success: agg.is_success(),
            finished_at: chrono::Utc::now().to_rfc3339(),
            outcomes,
        }
    }
}

/// Per-app lines and summary on `out`, one `error:` line per failure on `err`.
pub fn aggregate_human(agg: &AggregateResult, out: &mut dyn Write, err: &mut dyn Write) -> Result<()> {
    for o in &agg.outcomes {
        writeln!(out, "{:<17} {}", o.state.to_string(), o.id)?;
        if let Some(e) = &o.error {
            writeln!(err, "error: {}", e)?;
        }
    }
    writeln!(out, "{}", agg)?;
    Ok(())
}

pub fn aggregate_json(agg: &AggregateResult, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "{}", serde_json::to_string_pretty(&Report::from(agg))?)?;
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct AppRow<'a> {
    pub namespace: &'a str,
    pub name: &'a str,
    pub resource_version: &'a str,
    pub description: &'a str,
    pub labels: &'a BTreeMap<String, String>,
    pub annotations: &'a BTreeMap<String, String>,
}

impl<'a> AppRow<'a> {
    pub fn of(app: &'a dyn App) -> Self {
        let meta = app.meta();
        AppRow {
            namespace: meta.namespace(),
            name: meta.name(),
            resource_version: meta.resource_version(),
            description: app.description(),
            labels: meta.labels(),
            annotations: meta.annotations(),
        }
    }
}

pub fn list_human(rows: &[AppRow<'_>], out: &mut dyn Write) -> Result<()> {
    writeln!(out, "{:<16} {:<24} {:<10} DESCRIPTION", "NAMESPACE", "NAME", "VERSION")?;
    for r in rows {
        let rv = if r.resource_version.is_empty() { "-" } else { r.resource_version };
        writeln!(out, "{:<16} {:<24} {:<10} {}", r.namespace, r.name, rv, r.description)?;
    }
    Ok(())
}

pub fn describe_human(row: &AppRow<'_>, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "Name:             {}", row.name)?;
    writeln!(out, "Namespace:        {}", row.namespace)?;
    writeln!(out, "Resource version: {}", row.resource_version)?;
    writeln!(out, "Description:      {}", row.description)?;
    writeln!(out, "Labels:")?;
    for (k, v) in row.labels {
        writeln!(out, "  {}={}", k, v)?;
    }
    writeln!(out, "Annotations:")?;
    for (k, v) in row.annotations {
        writeln!(out, "  {}={}", k, v)?;
    }
    Ok(())
}
