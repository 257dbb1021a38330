//! kcertwatch
//!
//! Exports the expiry time of certificates stored in Kubernetes Secrets as
//! Prometheus metrics.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          kcertwatch                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │    Secret    │───▶│    Secret    │───▶│    Expiry    │       │
//! │  │   Informer   │    │  Reconciler  │    │   Registry   │       │
//! │  └──────────────┘    └──────────────┘    └──────┬───────┘       │
//! │                      ┌──────────────┐           │               │
//! │                      │   Garbage    │───────────┤               │
//! │                      │  Collector   │           ▼               │
//! │                      └──────────────┘    /metrics endpoint      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use kube::{Client, Config};
use prometheus::Registry;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use kcertwatch::adapters::prometheus::encode_text;
use kcertwatch::adapters::{kubernetes, PrometheusExpirySink, SystemClock};
use kcertwatch::controller::{
    GarbageCollector, GcConfig, InformerConfig, SecretInformer, SecretReconciler,
};
use kcertwatch::domain::Clock;
use kcertwatch::error::{Error, Result};
use kcertwatch::registry::{ExpiryRegistry, Tallies};
use kcertwatch::telemetry::{self, LogCounterLayer};

// =============================================================================
// CLI Arguments
// =============================================================================

/// kcertwatch - Certificate expiry exporter for Kubernetes Secrets
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Kubernetes API server URL (empty: in-cluster config or kubeconfig)
    #[arg(long, env = "K8S_API", default_value = "")]
    k8s_api: String,

    /// Namespace to watch (empty: all namespaces)
    #[arg(long, env = "WATCH_NAMESPACE", default_value = "")]
    namespace: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:9102")]
    metrics_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Resync and garbage collection period in seconds
    #[arg(long, env = "RESYNC_PERIOD_SECONDS", default_value = "300")]
    resync_period_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let metrics = Registry::new();

    let log_counters = LogCounterLayer::new()?;
    log_counters.register(&metrics)?;
    telemetry::init_logging(&args.log_level, args.log_json, log_counters)?;

    info!("Starting kcertwatch {}", env!("CARGO_PKG_VERSION"));
    info!("  Kubernetes API: {:?}", args.k8s_api);
    info!("  Namespace: {:?}", args.namespace);
    info!("  Metrics address: {}", args.metrics_addr);
    info!("  Health address: {}", args.health_addr);
    info!("  Resync period: {}s", args.resync_period_seconds);
    info!("  Log level: {}", args.log_level);
    info!("  Log JSON: {}", args.log_json);

    let period = Duration::from_secs(args.resync_period_seconds);
    let gc_config = GcConfig::new(period)?;
    let informer_config = InformerConfig {
        resync_period: period,
    };

    let metrics_addr = parse_addr("metrics", &args.metrics_addr)?;
    let health_addr = parse_addr("health", &args.health_addr)?;

    // Expiry registry publishing into the dedicated metrics registry
    let sink = PrometheusExpirySink::new()?;
    sink.register(&metrics)?;
    let tallies = Tallies::new()?;
    tallies.register(&metrics)?;
    let registry = ExpiryRegistry::with_tallies(Arc::new(sink), tallies);

    let client = kube_client(&args.k8s_api).await.map_err(|e| {
        error!("Failed to create Kubernetes client: {}", e);
        e
    })?;
    info!("Connected to Kubernetes cluster");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let reconciler = SecretReconciler::new(registry.clone(), clock.clone());
    let informer = SecretInformer::new(reconciler);
    let synced = informer.synced_flag();
    let gc = GarbageCollector::new(gc_config, registry, clock);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    // Start HTTP servers
    let health_listener = TcpListener::bind(health_addr).await?;
    info!("Health server listening on {}", health_addr);
    let health_server = tokio::spawn(serve(
        "health",
        health_listener,
        health_handler(synced),
        shutdown.clone(),
    ));

    let metrics_listener = TcpListener::bind(metrics_addr).await?;
    info!("Metrics server listening on {}", metrics_addr);
    let metrics_server = tokio::spawn(serve(
        "metrics",
        metrics_listener,
        metrics_handler(metrics),
        shutdown.clone(),
    ));

    // Background workers
    let gc_task = tokio::spawn(gc.run(shutdown.clone()));

    let api = kubernetes::secrets_api(client, Some(args.namespace.as_str()));
    let informer_task = tokio::spawn(informer.run(api, informer_config, shutdown.clone()));

    if let Err(e) = informer_task.await {
        error!("Secret informer task failed: {}", e);
    }
    shutdown.cancel();

    if let Err(e) = gc_task.await {
        error!("Garbage collector task failed: {}", e);
    }
    for task in [health_server, metrics_server] {
        if let Err(e) = task.await {
            error!("HTTP server task failed: {}", e);
        }
    }

    info!("kcertwatch shutdown complete");
    Ok(())
}

fn parse_addr(server: &str, addr: &str) -> Result<SocketAddr> {
    addr.parse()
        .map_err(|e| Error::Config(format!("Invalid {} server address {:?}: {}", server, addr, e)))
}

// =============================================================================
// Kubernetes Client
// =============================================================================

/// Build a client from the inferred configuration, pointing it at `k8s_api`
/// when one is given.
async fn kube_client(k8s_api: &str) -> Result<Client> {
    let config = if k8s_api.is_empty() {
        Config::infer().await?
    } else {
        let url: Uri = k8s_api
            .parse()
            .map_err(|e| Error::Config(format!("Invalid Kubernetes API URL {:?}: {}", k8s_api, e)))?;
        match Config::infer().await {
            Ok(mut config) => {
                config.cluster_url = url;
                config
            }
            Err(e) => {
                debug!("No inferable cluster configuration, using {} without credentials: {}", url, e);
                Config::new(url)
            }
        }
    };

    Ok(Client::try_from(config)?)
}

// =============================================================================
// Shutdown
// =============================================================================

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

// =============================================================================
// HTTP Servers
// =============================================================================

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn not_found() -> Response<Full<Bytes>> {
    respond(StatusCode::NOT_FOUND, "text/plain", "not found")
}

/// `/healthz` and `/livez` always answer ok; `/readyz` only once the first
/// list of Secrets has been processed.
fn health_handler(synced: Arc<AtomicBool>) -> impl Fn(&str) -> Response<Full<Bytes>> + Clone + Send + Sync + 'static {
    move |path: &str| match path {
        "/healthz" | "/livez" => respond(StatusCode::OK, "text/plain", "ok"),
        "/readyz" if synced.load(Ordering::Acquire) => respond(StatusCode::OK, "text/plain", "ok"),
        "/readyz" => respond(StatusCode::SERVICE_UNAVAILABLE, "text/plain", "informer not synced"),
        _ => not_found(),
    }
}

fn metrics_handler(metrics: Registry) -> impl Fn(&str) -> Response<Full<Bytes>> + Clone + Send + Sync + 'static {
    move |path: &str| match path {
        "/metrics" => match encode_text(&metrics) {
            Ok(text) => respond(StatusCode::OK, prometheus::TEXT_FORMAT, text),
            Err(e) => {
                error!("Failed to encode metrics: {}", e);
                respond(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", "failed to encode metrics")
            }
        },
        _ => not_found(),
    }
}

/// Accept HTTP/1 connections on `listener` until `shutdown` is cancelled.
async fn serve<F>(name: &'static str, listener: TcpListener, handler: F, shutdown: CancellationToken)
where
    F: Fn(&str) -> Response<Full<Bytes>> + Clone + Send + Sync + 'static,
{
    loop {
        let stream = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("{} server shutting down", name);
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => stream,
                Err(e) => {
                    error!("{} server accept error: {}", name, e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            },
        };

        let io = TokioIo::new(stream);
        let handler = handler.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let response = handler(req.uri().path());
                async move { Ok::<_, Infallible>(response) }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("{} server connection error: {}", name, e);
            }
        });
    }
}
