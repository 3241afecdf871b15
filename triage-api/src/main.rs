//! TRIAGE server entry point
//!
//! Bootstraps configuration, the cache tiers, the adapter registry, and
//! the Axum HTTP server. Exit codes: 0 clean shutdown, 1 fatal config or
//! startup error, 2 runtime fatal.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use triage_adapters::{build_adapter, AdapterRegistry};
use triage_api::{
    create_api_router, init_tracing, load_config, AppState, HealthMonitor, PerformanceTracker,
    ToolEngine,
};
use triage_cache::HybridCache;
use triage_core::{FeedbackLedger, SourceError};
use triage_query::{ProcessorConfig, QueryProcessor};

const EXIT_OK: i32 = 0;
const EXIT_STARTUP: i32 = 1;
const EXIT_RUNTIME: i32 = 2;

/// Retained feedback entries before oldest-first eviction.
const FEEDBACK_CAPACITY: usize = 1000;

fn main() {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to start runtime: {}", e);
            std::process::exit(EXIT_RUNTIME);
        }
    };
    let code = runtime.block_on(run());
    std::process::exit(code);
}

async fn run() -> i32 {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("TRIAGE_CONFIG").ok())
        .unwrap_or_else(|| "triage.yaml".to_string());

    let config = match load_config(&PathBuf::from(&config_path)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load config {}: {}", config_path, e);
            return EXIT_STARTUP;
        }
    };

    init_tracing(&config.server.log_level);
    tracing::info!(config = %config_path, "starting triage server");

    // Cache tiers.
    let cache = if config.cache.enabled {
        match HybridCache::from_settings(&config.cache) {
            Ok(cache) => Arc::new(cache),
            Err(e) => {
                tracing::error!(error = %e, "cache construction failed");
                return EXIT_STARTUP;
            }
        }
    } else {
        Arc::new(HybridCache::disabled())
    };
    // First slow-tier connection attempt; failure degrades, never blocks.
    cache.maintain().await;

    // Adapter federation.
    let registry = Arc::new(AdapterRegistry::new());
    for source in config.enabled_sources() {
        let adapter = match build_adapter(source) {
            Ok(adapter) => adapter,
            Err(e) => {
                tracing::error!(source = %source.name, error = %e, "adapter construction failed");
                return EXIT_STARTUP;
            }
        };
        match registry.register(adapter).await {
            Ok(()) => {}
            // A source that is down right now joins later via config
            // reload; a permanently misconfigured one is fatal.
            Err(e @ SourceError::Permanent { .. }) => {
                tracing::error!(source = %source.name, error = %e, "adapter initialization failed");
                return EXIT_STARTUP;
            }
            Err(e) => {
                tracing::warn!(
                    source = %source.name,
                    error = %e,
                    "source unavailable at startup, skipping"
                );
            }
        }
    }

    // Query pipeline and the tool layer.
    let processor = Arc::new(QueryProcessor::new(ProcessorConfig::default()));
    let ledger = Arc::new(FeedbackLedger::new(FEEDBACK_CAPACITY));
    let metrics = Arc::new(PerformanceTracker::new());
    let tools = Arc::new(ToolEngine::new(
        Arc::clone(&registry),
        Arc::clone(&cache),
        processor,
        ledger,
        Arc::clone(&metrics),
    ));
    tools.warmup().await;

    // Health polling.
    let monitor = Arc::new(HealthMonitor::new(
        Arc::clone(&registry),
        Arc::clone(&cache),
        Duration::from_millis(config.server.health_check_interval_ms.max(1000)),
    ));
    monitor.poll_now().await;
    let monitor_task = Arc::clone(&monitor).spawn();

    let state = AppState {
        tools,
        registry: Arc::clone(&registry),
        cache,
        metrics,
        monitor,
        request_permits: Arc::new(Semaphore::new(config.server.max_concurrent_requests)),
        config: Arc::new(config.clone()),
        start_time: std::time::Instant::now(),
    };
    let app = create_api_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let addr: SocketAddr = match addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "invalid bind address");
            return EXIT_STARTUP;
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "bind failed");
            return EXIT_STARTUP;
        }
    };
    tracing::info!(%addr, "listening");

    let server = axum::serve(listener, app);
    let code = tokio::select! {
        result = server => match result {
            Ok(()) => EXIT_OK,
            Err(e) => {
                tracing::error!(error = %e, "server error");
                EXIT_RUNTIME
            }
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            EXIT_OK
        }
    };

    monitor_task.abort();
    registry.shutdown_all().await;
    tracing::info!("shutdown complete");
    code
}
