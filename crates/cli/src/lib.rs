//! Kord command-line runner.
//!
//! A hosting binary registers its apps and hands the registry to [`run`]:
//!
//! ```ignore
//! let registry = kord_registry::Registry::new();
//! registry.register(MyApp::new("default", "web"))?;
//! std::process::exit(kordctl::run(&registry).await)
//! ```

#![forbid(unsafe_code)]

use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use kord_core::Backend;
use kord_dispatch::{Command, DispatchConfig, Dispatcher, Selection};
use kord_kubehub::KubeBackend;
use kord_registry::Registry;
use tracing::{error, info, warn};

pub mod render;

#[derive(Parser, Debug)]
#[command(name = "kordctl", version, about = "Apply or delete registered apps")]
pub struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    pub output: Output,

    /// Per-call backend timeout in seconds
    #[arg(long = "timeout", global = true, env = "KORD_CALL_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Apps dispatched concurrently (1 = sequential)
    #[arg(long = "concurrency", global = true, env = "KORD_DISPATCH_CONCURRENCY")]
    pub concurrency: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum Output { Human, Json }

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install registered apps
    Apply(Target),
    /// Uninstall registered apps
    Delete(Target),
    /// List registered apps in registration order
    List,
    /// Show metadata of one registered app
    Describe {
        /// Namespace of the app
        #[arg(long = "ns", default_value = "default")]
        namespace: String,
        /// App name
        #[arg(long = "name")]
        name: String,
    },
}

impl Commands {
    fn needs_backend(&self) -> bool {
        matches!(self, Commands::Apply(_) | Commands::Delete(_))
    }
}

/// Narrows a command to one app or a label selection. Default: every app.
#[derive(Args, Debug, Default, Clone)]
pub struct Target {
    /// Namespace of the targeted app
    #[arg(long = "ns", requires = "name")]
    pub namespace: Option<String>,

    /// Target a single app by name (namespace defaults to "default")
    #[arg(long = "name", conflicts_with = "labels")]
    pub name: Option<String>,

    /// Label selector, repeatable: -l key=value
    #[arg(short = 'l', long = "selector", value_parser = parse_label)]
    pub labels: Vec<(String, String)>,
}

impl Target {
    pub fn selection(&self) -> Selection {
        if let Some(name) = &self.name {
            let ns = self.namespace.as_deref().unwrap_or("default");
            return Selection::one(ns, name.as_str());
        }
        if !self.labels.is_empty() {
            return Selection::labels(self.labels.iter().cloned());
        }
        Selection::All
    }
}

fn parse_label(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("invalid label selector {s:?} (expect key=value)")),
    }
}

impl Cli {
    /// Dispatch settings from flags or their `KORD_*` environment fallbacks.
    pub fn dispatch_config(&self) -> DispatchConfig {
        let mut cfg = DispatchConfig::default();
        if let Some(secs) = self.timeout_secs {
            cfg.call_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = self.concurrency {
            cfg.concurrency = n.max(1);
        }
        cfg
    }
}

pub fn init_tracing() {
    let env = std::env::var("KORD_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // stderr keeps stdout clean for -o json
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).try_init();
}

pub fn init_metrics() {
    if let Ok(addr) = std::env::var("KORD_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid KORD_METRICS_ADDR; expected host:port");
        }
    }
}

/// Parse the process arguments, run the command against the registry and
/// return the process exit code: 0 on full success, 1 otherwise. Usage errors
/// exit with clap's code 2 before anything runs.
pub async fn run(registry: &Registry) -> i32 {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    let backend: Option<Arc<dyn Backend>> = if cli.command.needs_backend() {
        match KubeBackend::try_default().await {
            Ok(b) => Some(Arc::new(b)),
            Err(e) => {
                error!(error = ?e, "cluster backend unavailable");
                eprintln!("error: {e:#}");
                return 1;
            }
        }
    } else {
        None
    };

    let res = execute(&cli, registry, backend, &mut std::io::stdout(), &mut std::io::stderr()).await;
    exit_code(res)
}

pub fn exit_code(res: Result<bool>) -> i32 {
    match res {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            error!(error = ?e, "command failed");
            eprintln!("error: {e:#}");
            1
        }
    }
}

/// Execute a parsed command. `Ok(false)` means the command ran but at least
/// one app failed; every failure has been written to `err`.
pub async fn execute(
    cli: &Cli,
    registry: &Registry,
    backend: Option<Arc<dyn Backend>>,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<bool> {
    match &cli.command {
        Commands::Apply(target) | Commands::Delete(target) => {
            let command = if matches!(cli.command, Commands::Apply(_)) { Command::Apply } else { Command::Delete };
            let backend = backend.ok_or_else(|| anyhow!("{command} needs a cluster backend"))?;
            let selection = target.selection();
            info!(%command, selection = ?selection, apps = registry.len(), "command invoked");
            let dispatcher = Dispatcher::new(backend, cli.dispatch_config());
            let agg = dispatcher
                .run(command, registry, &selection)
                .await
                .with_context(|| format!("{command} aborted before dispatch"))?;
            match cli.output {
                Output::Human => render::aggregate_human(&agg, out, err)?,
                Output::Json => {
                    render::aggregate_json(&agg, out)?;
                    for e in agg.failures().filter_map(|o| o.error.as_ref()) {
                        writeln!(err, "error: {}", e)?;
                    }
                }
            }
            let transient = agg.failures().filter_map(|o| o.error.as_ref()).filter(|e| e.is_transient()).count();
            if transient > 0 {
                writeln!(err, "hint: {transient} failure(s) were transient; re-running `{command}` is safe")?;
            }
            match agg.into_result() {
                Ok(_) => Ok(true),
                Err(e) => {
                    warn!(error = %e, "batch finished with failures");
                    Ok(false)
                }
            }
        }
        Commands::List => {
            let apps = registry.all();
            let rows: Vec<_> = apps.iter().map(|a| render::AppRow::of(a.as_ref())).collect();
            match cli.output {
                Output::Human => render::list_human(&rows, out)?,
                Output::Json => writeln!(out, "{}", serde_json::to_string_pretty(&rows)?)?,
            }
            Ok(true)
        }
        Commands::Describe { name, namespace } => {
            let app = registry.find(namespace, name)?;
            let row = render::AppRow::of(app.as_ref());
            match cli.output {
                Output::Human => render::describe_human(&row, out)?,
                Output::Json => writeln!(out, "{}", serde_json::to_string_pretty(&row)?)?,
            }
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("kordctl").chain(args.iter().copied())).expect("parse")
    }

    #[test]
    fn apply_without_target_selects_all() {
        let cli = parse(&["apply"]);
        match cli.command {
            Commands::Apply(t) => assert_eq!(t.selection(), Selection::All),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(cli.output, Output::Human);
    }

    #[test]
    fn name_defaults_namespace() {
        let cli = parse(&["delete", "--name", "web"]);
        match cli.command {
            Commands::Delete(t) => assert_eq!(t.selection(), Selection::one("default", "web")),
            other => panic!("unexpected {other:?}"),
        }
        let cli = parse(&["delete", "--ns", "prod", "--name", "web"]);
        match cli.command {
            Commands::Delete(t) => assert_eq!(t.selection(), Selection::one("prod", "web")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn repeated_selectors_build_label_selection() {
        let cli = parse(&["apply", "-l", "app=web", "--selector", "tier=front"]);
        match cli.command {
            Commands::Apply(t) => assert_eq!(t.selection(), Selection::labels([("app", "web"), ("tier", "front")])),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn usage_errors_are_rejected() {
        let bad: &[&[&str]] = &[
            &["apply", "--ns", "prod"],
            &["apply", "--name", "web", "-l", "app=web"],
            &["apply", "-l", "novalue"],
            &["apply", "-l", "=x"],
            &["describe"],
            &["frobnicate"],
        ];
        for args in bad {
            let res = Cli::try_parse_from(std::iter::once("kordctl").chain(args.iter().copied()));
            assert!(res.is_err(), "expected usage error for {args:?}");
        }
    }

    #[test]
    fn flags_override_dispatch_config() {
        let cli = parse(&["--timeout", "5", "--concurrency", "0", "apply"]);
        let cfg = cli.dispatch_config();
        assert_eq!(cfg.call_timeout, Duration::from_secs(5));
        assert_eq!(cfg.concurrency, 1);
    }

    #[test]
    fn describe_takes_namespace_and_name_flags() {
        match parse(&["describe", "--ns", "prod", "--name", "web"]).command {
            Commands::Describe { namespace, name } => assert_eq!((namespace.as_str(), name.as_str()), ("prod", "web")),
            other => panic!("unexpected {other:?}"),
        }
        match parse(&["describe", "--name", "web"]).command {
            Commands::Describe { namespace, .. } => assert_eq!(namespace, "default"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(Cli::try_parse_from(["kordctl", "describe", "web"]).is_err());
    }

    #[test]
    fn dispatch_config_without_flags_is_the_default() {
        let cli = Cli::try_parse_from(["kordctl", "apply"]).unwrap();
        if cli.timeout_secs.is_none() && cli.concurrency.is_none() {
            assert_eq!(cli.dispatch_config(), DispatchConfig::default());
        }
    }

    #[test]
    fn global_output_flag_after_subcommand() {
        let cli = parse(&["list", "-o", "json"]);
        assert_eq!(cli.output, Output::Json);
    }

    #[test]
    fn exit_codes() {
        assert_eq!(exit_code(Ok(true)), 0);
        assert_eq!(exit_code(Ok(false)), 1);
        assert_eq!(exit_code(Err(anyhow!("boom"))), 1);
    }
}
