//! hostns-exporter - Prometheus endpoint bound in the host network namespace
//!
//! The process may live in a container's network namespace while its metrics
//! listener has to be reachable on the host:
//! - the listener is bound in the namespace at `--netns-path` before any
//!   other thread exists, then the main thread switches back
//! - the tokio runtime is only built afterwards, so every worker thread
//!   starts out in the original namespace
//! - serving happens on the already bound socket

use anyhow::Context;
use clap::Parser;
use hostns_core::{
    LinuxNetns, ListenAddress, NamespaceId, NetNs, NetnsError, bind_listener, run_in_namespace,
};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

mod config;
mod metrics;
mod server;

use config::ExporterConfig;

/// Exit status when the main thread could not be switched back.
const EXIT_NAMESPACE_INCONSISTENT: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "hostns-exporter")]
#[command(author, version, about = "Serve Prometheus metrics from the host network namespace")]
struct Cli {
    /// The address to listen on for HTTP requests
    #[arg(long, env = "HOSTNS_LISTEN_ADDRESS")]
    listen_address: Option<ListenAddress>,

    /// Namespace file of the network namespace to bind the listener in
    #[arg(long, env = "HOSTNS_NETNS_PATH")]
    netns_path: Option<PathBuf>,

    /// HTTP path to serve metrics on
    #[arg(long)]
    metrics_path: Option<String>,

    /// JSON config file; flags take precedence over its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<ExporterConfig> {
        let mut config = match &self.config {
            Some(path) => ExporterConfig::load(path)?,
            None => ExporterConfig::default(),
        };

        if let Some(address) = self.listen_address {
            config.bootstrap.listen_address = address;
        }
        if let Some(path) = self.netns_path {
            config.bootstrap.netns_path = path;
        }
        if let Some(path) = self.metrics_path {
            config.metrics_path = path;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.log_json) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match cli.into_config().and_then(run) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let fatal = e.downcast_ref::<NetnsError>().is_some_and(NetnsError::is_fatal);
            let message = format!("{e:#}");
            tracing::error!(error = %message, fatal, "hostns-exporter failed");
            if fatal {
                ExitCode::from(EXIT_NAMESPACE_INCONSISTENT)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("hostns=info".parse()?);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn run(config: ExporterConfig) -> anyhow::Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_address = %config.bootstrap.listen_address,
        netns_path = %config.bootstrap.netns_path.display(),
        "hostns-exporter starting"
    );

    // Still single-threaded here: the switch only affects this thread.
    let started = Instant::now();
    let (listener, netns) =
        bind_in_namespace(&config.bootstrap.netns_path, &config.bootstrap.listen_address)?;
    let bootstrap_time = started.elapsed();

    tracing::info!(
        %netns,
        local_addr = %listener.local_addr()?,
        bootstrap_ms = bootstrap_time.as_millis(),
        "listener bound, namespace restored"
    );

    let metrics = metrics::ExporterMetrics::new(netns, bootstrap_time)
        .context("prometheus registry setup error")?;
    tracing::info!("configured Prometheus registry");

    let app = server::router(
        server::AppState::new(metrics),
        &config.metrics_path,
        config.request_timeout(),
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("hostns-worker")
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(server::run(listener, app))?;
    runtime.shutdown_timeout(Duration::from_secs(5));
    Ok(())
}

/// Bind the listener inside the namespace at `netns_path`, also recording the
/// identity of the namespace it ended up in.
fn bind_in_namespace(
    netns_path: &Path,
    address: &ListenAddress,
) -> Result<(TcpListener, NamespaceId), NetnsError> {
    run_in_namespace(&LinuxNetns, netns_path, || {
        let netns = NetNs::current()?.id();
        let listener = bind_listener(address)?;
        Ok((listener, netns))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults() {
        let cli = Cli::try_parse_from(["hostns-exporter"]).unwrap();
        let config = cli.into_config().unwrap();
        assert_eq!(config.bootstrap.listen_address.to_string(), ":7082");
        assert_eq!(config.metrics_path, "/metrics");
    }

    #[test]
    fn cli_flags_override() {
        let cli = Cli::try_parse_from([
            "hostns-exporter",
            "--listen-address",
            "127.0.0.1:9100",
            "--netns-path",
            "/run/netns/host",
            "--log-json",
        ])
        .unwrap();
        assert!(cli.log_json);

        let config = cli.into_config().unwrap();
        assert_eq!(config.bootstrap.listen_address.port(), 9100);
        assert_eq!(config.bootstrap.netns_path, Path::new("/run/netns/host"));
    }

    #[test]
    fn cli_rejects_bad_address() {
        let err = Cli::try_parse_from(["hostns-exporter", "--listen-address", "nope"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn missing_namespace_is_not_fatal() {
        let err = bind_in_namespace(Path::new("/proc/does-not-exist/ns/net"), &ListenAddress::any(0))
            .unwrap_err();
        assert!(matches!(err, NetnsError::NamespaceNotFound { .. }));
        assert!(!err.is_fatal());
    }
}
