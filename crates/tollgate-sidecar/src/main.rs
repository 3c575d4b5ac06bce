//! Tollgate sidecar entry point.

use std::path::PathBuf;
use std::process;

use tracing::{error, info};

use tollgate_sidecar::{telemetry, SidecarConfig, SidecarResult, SidecarServer};

/// Command-line arguments.
struct Args {
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--help" | "-h" => {
                    print_help();
                    process::exit(0);
                }
                "--version" | "-v" => {
                    println!("tollgate-sidecar {}", tollgate_sidecar::VERSION);
                    process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    process::exit(1);
                }
            }
        }

        Self { config }
    }
}

fn print_help() {
    println!(
        r"Tollgate sidecar - authorizing reverse proxy

USAGE:
    tollgate-sidecar [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    TOLLGATE_LISTEN_PORT        Listen port (default: 8080)
    TOLLGATE_UPSTREAM_URL       Upstream service URL (default: http://localhost:3000)
    TOLLGATE_UPSTREAM_TIMEOUT   Upstream timeout, e.g. 30s or 1500ms (default: 30s)
    TOLLGATE_PRINCIPAL_HEADER   Header carrying the caller identity (default: x-caller-identity)
    TOLLGATE_METRICS_PORT       Dedicated Prometheus port (default: served on /_tollgate/metrics)
    TOLLGATE_LOG_LEVEL          Log filter when RUST_LOG is unset (default: info)

SIGNALS:
    SIGHUP    Reload authorization rules from the configuration file
"
    );
}

fn load_config(path: Option<&PathBuf>) -> SidecarResult<SidecarConfig> {
    let config = match path {
        Some(path) => SidecarConfig::from_file(path)?,
        None => SidecarConfig::default(),
    }
    .with_env_overrides();
    config.validate()?;
    Ok(config)
}

#[cfg(unix)]
fn spawn_reload_on_sighup(path: PathBuf, gatekeeper: std::sync::Arc<tollgate_authz::Gatekeeper>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangups = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, "failed to install SIGHUP handler; reload disabled");
            return;
        }
    };

    tokio::spawn(async move {
        while hangups.recv().await.is_some() {
            info!(path = %path.display(), "reloading authorization rules");
            let result = load_config(Some(&path))
                .and_then(|config| gatekeeper.reload(config.authorization).map_err(Into::into));
            if let Err(e) = result {
                error!(error = %e, "reload failed; keeping current rules");
            }
        }
    });
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match load_config(args.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = telemetry::init_logging(&config.telemetry) {
        eprintln!("{e}");
        process::exit(1);
    }
    if let Err(e) = telemetry::init_metrics(&config.telemetry) {
        error!(error = %e, "failed to initialise metrics");
        process::exit(1);
    }

    info!(
        version = tollgate_sidecar::VERSION,
        listen = %format!("{}:{}", config.sidecar.listen_addr, config.sidecar.listen_port),
        upstream = %config.sidecar.upstream_url,
        coarse = config.authorization.coarse.is_active(),
        fine_grain = config.authorization.fine_grain.is_active(),
        "starting Tollgate sidecar"
    );

    let server = match SidecarServer::new(config) {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "failed to create server");
            process::exit(1);
        }
    };

    #[cfg(unix)]
    {
        if let Some(path) = args.config {
            spawn_reload_on_sighup(path, server.gatekeeper());
        }
    }

    if let Err(e) = server.run().await {
        error!(error = %e, "server error");
        process::exit(1);
    }
}
