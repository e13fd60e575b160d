//! hosts-reconciler binary entry point.

use clap::Parser;
use hosts_reconciler::config::DEFAULT_HOSTS_FILE;
use hosts_reconciler::{
    AddressType, ControllerEndpoint, DEFAULT_SENTINEL, HostsFile, KubeFetcher, Reconciler,
    ReconcilerConfig, kube_fetcher, telemetry, util,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Point cluster ingress and node names at the cluster from /etc/hosts.
#[derive(Parser, Debug)]
#[command(name = "hosts-reconciler")]
#[command(version, about, long_about = None)]
struct Args {
    /// Kubeconfig file. Inferred from KUBECONFIG or ~/.kube/config when unset.
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Force ingress hosts to resolve to this IP and pin the API server
    /// host to it as well. Looked up from the kubeconfig server when unset.
    #[arg(long, env = "HOSTS_RECONCILER_CONTROLLER_IP")]
    controller_ip: Option<String>,

    /// Hosts file to manage.
    #[arg(long, env = "HOSTS_RECONCILER_HOSTS_FILE", default_value = DEFAULT_HOSTS_FILE)]
    hosts_file: PathBuf,

    /// Node address written for node hostnames: InternalIP or ExternalIP.
    #[arg(long, default_value = "InternalIP")]
    address_type: AddressType,

    /// Keep polling instead of exiting after one pass.
    #[arg(long)]
    run_forever: bool,

    /// Seconds between polls.
    #[arg(long, default_value_t = 10)]
    interval: u64,

    /// Remove managed entries when stopped by a signal.
    #[arg(long)]
    cleanup_on_exit: bool,

    /// Marker identifying managed lines.
    #[arg(long, default_value = DEFAULT_SENTINEL, hide_default_value = true)]
    sentinel: String,

    /// Print the managed entries currently in the hosts file and exit.
    #[arg(long)]
    list: bool,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = telemetry::DEFAULT_LOG_LEVEL)]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = telemetry::init(&args.log_level) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => {
            info!("hosts-reconciler finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "hosts-reconciler failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> hosts_reconciler::Result<()> {
    let hosts = HostsFile::new(&args.hosts_file).with_sentinel(args.sentinel)?;

    if args.list {
        for (name, target) in &hosts.owned_entries()? {
            println!("{target} {name}");
        }
        return Ok(());
    }

    let config = ReconcilerConfig::new(&args.hosts_file)
        .with_poll_interval(Duration::from_secs(args.interval))
        .with_run_forever(args.run_forever)
        .with_cleanup_on_exit(args.cleanup_on_exit);
    config.validate()?;

    if !util::can_stage_next_to(&config.hosts_file) {
        warn!(
            path = %config.hosts_file.display(),
            "Hosts file directory does not look writable; rewrites will likely fail (run as root?)"
        );
    }

    let kube_config = kube_fetcher::load_config(args.kubeconfig.as_deref()).await?;
    let host = kube_fetcher::controller_host(&kube_config)?;
    let controller = match args.controller_ip {
        Some(ip) => ControllerEndpoint::pinned(host, ip)?,
        None => ControllerEndpoint::resolve(host).await?,
    };

    info!(
        hosts_file = %config.hosts_file.display(),
        cluster = %kube_config.cluster_url,
        controller_host = %controller.host,
        controller_ip = %controller.ip,
        address_type = %args.address_type,
        run_forever = config.run_forever,
        interval = ?config.poll_interval,
        "Starting hosts-reconciler"
    );

    let fetcher = KubeFetcher::from_config(kube_config, args.address_type, controller)?;
    let reconciler = Reconciler::new(fetcher, hosts, &config)?;

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    reconciler.run(shutdown).await
}

/// Cancels `shutdown` on Ctrl-C or SIGTERM.
///
/// If no handler can be installed the token is left alone: the process
/// keeps running and can still be stopped by the default signal action.
async fn watch_signals(shutdown: CancellationToken) {
    if wait_for_signal().await {
        info!("Shutdown signal received, stopping after the current cycle");
        shutdown.cancel();
    }
}

/// Returns `true` once a stop signal arrives, `false` if none can be
/// awaited.
async fn wait_for_signal() -> bool {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if is_stop_request(result) {
                            true
                        } else {
                            term.recv().await.is_some()
                        }
                    }
                    received = term.recv() => received.is_some(),
                }
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM, only Ctrl-C will stop");
                is_stop_request(tokio::signal::ctrl_c().await)
            }
        }
    }
    #[cfg(not(unix))]
    {
        is_stop_request(tokio::signal::ctrl_c().await)
    }
}

/// Interprets the outcome of waiting for Ctrl-C. A handler that failed to
/// install is not a request to stop.
fn is_stop_request(result: std::io::Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            error!(error = %err, "Error handling Ctrl-C signal");
            false
        }
    }
}
