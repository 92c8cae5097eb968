//! ONTAP volume plugin
//!
//! Loads the backend configuration, binds the configured array protocol,
//! bootstraps the orchestrator and serves the Docker volume-plugin API.
//! Metrics and health endpoints are served on a separate address.
//!
//! A backend that cannot be bootstrapped does not stop the process: the
//! plugin keeps answering Docker, failing every call with the startup error.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ontap_control_plane::frontend::docker;
use ontap_control_plane::{
    BackendFactory, BackendOrchestrator, DockerPlugin, NfsMounter, OntapConfig, OrchestratorConfig, RequestContext,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// ONTAP volume plugin - Docker volumes on NetApp ONTAP over ZAPI or REST
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend configuration file (YAML)
    #[arg(long, env = "ONTAP_CONFIG", default_value = "/etc/ontap-volume-plugin/config.yaml")]
    config: PathBuf,

    /// Plugin bind address; overrides pluginListenAddr from the config file
    #[arg(long, env = "PLUGIN_LISTEN_ADDR")]
    listen_addr: Option<String>,

    /// Host directory volumes are mounted under; overrides volumeRoot
    #[arg(long, env = "VOLUME_ROOT")]
    volume_root: Option<String>,

    /// Metrics and health server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// How long to keep retrying the array at startup, in seconds
    #[arg(long, env = "BOOTSTRAP_TIMEOUT", default_value = "120")]
    bootstrap_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Print the configuration JSON schema and exit
    #[arg(long)]
    print_config_schema: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.print_config_schema {
        println!("{}", OntapConfig::json_schema()?);
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting ONTAP volume plugin");
    info!("  Version: {}", ontap_control_plane::VERSION);
    info!("  Config: {}", args.config.display());

    let mut config = OntapConfig::from_file(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;
    if let Some(addr) = &args.listen_addr {
        config.plugin_listen_addr = addr.clone();
    }
    if let Some(root) = &args.volume_root {
        config.volume_root = root.clone();
    }
    config.validate().context("validating configuration")?;

    info!("  Protocol: {}", config.api);
    info!("  SVM: {}", config.svm);
    info!("  Plugin API: {}", config.plugin_listen_addr);

    let api = BackendFactory::create(&config).context("creating array backend")?;
    let orchestrator = BackendOrchestrator::new(
        api,
        OrchestratorConfig::from_config(&config).context("building orchestrator configuration")?,
        Arc::new(NfsMounter::new()),
    );

    let ctx = RequestContext::background();
    let bootstrap_timeout = Duration::from_secs(args.bootstrap_timeout_secs);
    if let Err(e) = orchestrator.bootstrap_with_retry(&ctx, bootstrap_timeout).await {
        error!(error = %e, "Backend bootstrap failed; plugin will report the failure to Docker");
        orchestrator.set_bootstrap_error(&e);
    }

    // Start metrics and health server
    let metrics_addr: SocketAddr = args
        .metrics_addr
        .parse()
        .with_context(|| format!("invalid metrics address {}", args.metrics_addr))?;
    let health_orchestrator = orchestrator.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(metrics_addr, health_orchestrator).await {
            error!("Metrics server error: {}", e);
        }
    });

    let plugin = DockerPlugin::new(orchestrator.clone(), &config.volume_root, config.request_timeout());
    plugin.prepare().await.context("preparing volume root")?;

    let addr: SocketAddr = config
        .plugin_listen_addr
        .parse()
        .with_context(|| format!("invalid plugin listen address {}", config.plugin_listen_addr))?;
    docker::serve(addr, plugin, shutdown_signal()).await?;

    info!("Volume plugin shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=info".parse()?)
        .add_directive("tower_http=info".parse()?);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: SocketAddr, orchestrator: Arc<BackendOrchestrator>) -> anyhow::Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let orchestrator = orchestrator.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let orchestrator = orchestrator.clone();
                async move {
                    let response = match req.uri().path() {
                        "/metrics" => {
                            let (content_type, buffer) = ontap_control_plane::metrics::gather();
                            Response::builder()
                                .status(StatusCode::OK)
                                .header("Content-Type", content_type)
                                .body(Body::from(buffer))
                        }
                        "/healthz" | "/livez" => Response::builder().status(StatusCode::OK).body(Body::from("ok")),
                        "/readyz" if orchestrator.is_bootstrapped() => {
                            Response::builder().status(StatusCode::OK).body(Body::from("ok"))
                        }
                        "/readyz" => Response::builder()
                            .status(StatusCode::SERVICE_UNAVAILABLE)
                            .body(Body::from("backend not bootstrapped")),
                        _ => Response::builder()
                            .status(StatusCode::NOT_FOUND)
                            .body(Body::from("not found")),
                    };
                    response.or_else(|_| Ok::<_, std::convert::Infallible>(Response::new(Body::empty())))
                }
            }))
        }
    });

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .context("metrics server")?;

    Ok(())
}
