//! ESTA Cache Admin
//!
//! Operational entry point for the shared cache and circuit state: checks
//! store connectivity, invalidates tenant entries, inspects and overrides
//! circuits, and serves health and Prometheus endpoints.
//!
//! ```text
//! esta-cache ping
//! esta-cache invalidate --tenant t1 [--prefix accrual]
//! esta-cache circuits
//! esta-cache force-circuit email open
//! esta-cache reset-circuit email
//! esta-cache serve --addr 0.0.0.0:8080
//! ```

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use esta_cache::{
    connect, CacheService, CircuitMetrics, CircuitRegistry, CircuitState, Error, KvStore, KvStoreRef,
    Result, StoreConfig,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// ESTA Cache - tenant cache and circuit breaker administration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// REST key-value store URL (in-memory fallback when unset)
    #[arg(long, env = "UPSTASH_REDIS_REST_URL")]
    store_url: Option<String>,

    /// REST key-value store bearer token
    #[arg(long, env = "UPSTASH_REDIS_REST_TOKEN", hide_env_values = true)]
    store_token: Option<String>,

    /// Per-request store timeout in milliseconds
    #[arg(long, env = "STORE_TIMEOUT_MS", default_value = "5000")]
    store_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the store answers
    Ping,

    /// Delete cached entries of a tenant
    Invalidate {
        /// Tenant whose entries are removed
        #[arg(long)]
        tenant: String,

        /// Restrict removal to one dataset prefix
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Print metrics of every registered circuit as JSON
    Circuits,

    /// Pin a circuit to a state (closed, open, half-open)
    ForceCircuit { name: String, state: String },

    /// Return a circuit to a fresh closed state
    ResetCircuit { name: String },

    /// Serve health and Prometheus endpoints
    Serve {
        /// Bind address
        #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
        addr: String,
    },
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let store_config = StoreConfig {
        rest_url: args.store_url.clone().filter(|v| !v.trim().is_empty()),
        rest_token: args.store_token.clone().filter(|v| !v.trim().is_empty()),
        request_timeout: Duration::from_millis(args.store_timeout_ms),
    };
    let store = connect(&store_config)?;
    let registry = CircuitRegistry::with_defaults(store.clone());

    match args.command {
        Command::Ping => {
            store.ping().await?;
            println!("PONG ({})", store.backend());
        }
        Command::Invalidate { tenant, prefix } => {
            let cache = CacheService::new(store.clone());
            let removed = match prefix.as_deref() {
                Some(prefix) => cache.invalidate_prefix(&tenant, prefix).await?,
                None => cache.invalidate_all_for_tenant(&tenant).await?,
            };
            println!("{}", removed);
        }
        Command::Circuits => {
            let metrics = registry.all_metrics().await?;
            println!("{}", serde_json::to_string_pretty(&metrics)?);
        }
        Command::ForceCircuit { name, state } => {
            let state: CircuitState = state.parse()?;
            registry.require(&name)?.force_state(state).await?;
            println!("{} -> {}", name, state);
        }
        Command::ResetCircuit { name } => {
            registry.require(&name)?.reset().await?;
            println!("{} -> {}", name, CircuitState::Closed);
        }
        Command::Serve { addr } => {
            info!("Starting ESTA cache admin server");
            info!("  Version: {}", esta_cache::VERSION);
            info!("  Store backend: {}", store.backend());
            info!("  Circuits: {}", registry.names().join(", "));

            let state = Arc::new(ServeState::new(store, registry)?);
            run_server(&addr, state).await?;
            info!("Admin server shutdown complete");
        }
    }

    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    // Logs go to stderr so command output on stdout stays parseable
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

// =============================================================================
// Health & Metrics Server
// =============================================================================

struct ServeState {
    store: KvStoreRef,
    registry: CircuitRegistry,
    store_up: prometheus::IntGauge,
    circuit_state: prometheus::IntGaugeVec,
    circuit_failures: prometheus::IntGaugeVec,
    circuit_requests: prometheus::IntGaugeVec,
}

impl ServeState {
    fn new(store: KvStoreRef, registry: CircuitRegistry) -> Result<Self> {
        let metric_error = |e: prometheus::Error| Error::Internal(format!("Metric registration failed: {}", e));

        let store_up = prometheus::register_int_gauge!(
            "esta_cache_store_up",
            "Whether the key-value store answered the last ping"
        )
        .map_err(metric_error)?;
        let circuit_state = prometheus::register_int_gauge_vec!(
            "esta_circuit_state",
            "Circuit state (0 closed, 1 half-open, 2 open)",
            &["circuit"]
        )
        .map_err(metric_error)?;
        let circuit_failures = prometheus::register_int_gauge_vec!(
            "esta_circuit_failures",
            "Failures counted toward opening the circuit",
            &["circuit"]
        )
        .map_err(metric_error)?;
        let circuit_requests = prometheus::register_int_gauge_vec!(
            "esta_circuit_requests",
            "Persisted request counters per circuit and outcome",
            &["circuit", "outcome"]
        )
        .map_err(metric_error)?;

        Ok(Self {
            store,
            registry,
            store_up,
            circuit_state,
            circuit_failures,
            circuit_requests,
        })
    }

    async fn store_ready(&self) -> bool {
        match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(backend = self.store.backend(), error = %e, "Store ping failed");
                false
            }
        }
    }

    /// Refresh gauges from the store and render the text exposition
    async fn render_metrics(&self) -> Result<Vec<u8>> {
        use prometheus::{Encoder, TextEncoder};

        self.store_up.set(i64::from(self.store_ready().await));
        for metrics in self.registry.all_metrics().await? {
            self.observe(&metrics);
        }

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| Error::Internal(format!("Metric encoding failed: {}", e)))?;
        Ok(buffer)
    }

    fn observe(&self, metrics: &CircuitMetrics) {
        let name = metrics.name.as_str();
        self.circuit_state
            .with_label_values(&[name])
            .set(metrics.state.as_gauge());
        self.circuit_failures
            .with_label_values(&[name])
            .set(i64::from(metrics.failures));

        for (outcome, count) in [
            ("total", metrics.total_requests),
            ("failed", metrics.failed_requests),
            ("successful", metrics.successful_requests),
            ("rejected", metrics.rejected_requests),
        ] {
            self.circuit_requests
                .with_label_values(&[name, outcome])
                .set(i64::try_from(count).unwrap_or(i64::MAX));
        }
    }
}

fn respond(
    status: hyper::StatusCode,
    content_type: &'static str,
    body: impl Into<hyper::Body>,
) -> hyper::Response<hyper::Body> {
    let mut response = hyper::Response::new(body.into());
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static(content_type),
    );
    response
}

async fn handle(state: Arc<ServeState>, req: hyper::Request<hyper::Body>) -> hyper::Response<hyper::Body> {
    use hyper::StatusCode;

    match req.uri().path() {
        "/healthz" | "/livez" => respond(StatusCode::OK, "text/plain", "ok"),
        "/readyz" => {
            if state.store_ready().await {
                respond(StatusCode::OK, "text/plain", "ok")
            } else {
                respond(StatusCode::SERVICE_UNAVAILABLE, "text/plain", "store unavailable")
            }
        }
        "/metrics" => match state.render_metrics().await {
            Ok(buffer) => respond(StatusCode::OK, prometheus::TEXT_FORMAT, buffer),
            Err(e) => {
                error!(error = %e, "Failed to render metrics");
                respond(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", e.to_string())
            }
        },
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "not found"),
    }
}

async fn run_server(addr: &str, state: Arc<ServeState>) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::Server;

    let make_svc = make_service_fn(move |_conn| {
        let state = state.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req| {
                let state = state.clone();
                async move { Ok::<_, std::convert::Infallible>(handle(state, req).await) }
            }))
        }
    });

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Configuration(format!("Invalid server address: {}", e)))?;

    info!("Admin server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .map_err(|e| Error::Internal(format!("Admin server error: {}", e)))?;

    Ok(())
}
