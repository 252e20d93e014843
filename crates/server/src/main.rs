use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seerrbridge_core::audit::{create_audit_system, AuditEvent, AuditStore, SqliteAuditStore};
use seerrbridge_core::backend::{create_side_effect_system, FetchBackend, HttpFetchBackend};
use seerrbridge_core::config::{Config, LogFormat};
use seerrbridge_core::metadata::{MetadataProvider, TraktClient};
use seerrbridge_core::upstream::{OverseerrClient, RequestService};
use seerrbridge_core::{
    load_config, validate_config, DispatchQueue, ReconciliationGateway, RetryPolicy,
    SanitizedConfig, Scheduler, SchedulerConfig, SqliteMediaStore,
};

use seerrbridge_server::api::create_router;
use seerrbridge_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Side-effect channel size when no backend section sets one
const DEFAULT_DISPATCH_BUFFER: usize = 256;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        eprintln!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());
    let registry = tracing_subscriber::registry().with(filter);

    match config.logging.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn run() -> Result<()> {
    let config_path = std::env::var("SEERRBRIDGE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    init_logging(&config);
    info!("Configuration loaded from {:?}", config_path);
    info!("Database path: {:?}", config.database.path);

    let config_hash = SanitizedConfig::from(&config).fingerprint();

    // Stores
    let audit_store: Arc<dyn AuditStore> = Arc::new(
        SqliteAuditStore::new(&config.database.path).context("Failed to create audit store")?,
    );
    let media_store = Arc::new(
        SqliteMediaStore::new(&config.database.path).context("Failed to create media store")?,
    );
    info!("Stores initialized");

    // Audit system
    let (audit_handle, audit_writer) =
        create_audit_system(Arc::clone(&audit_store), config.audit.buffer_size);
    let writer_handle = tokio::spawn(audit_writer.run());

    audit_handle
        .emit(AuditEvent::ServiceStarted {
            version: VERSION.to_string(),
            config_hash: config_hash[..16].to_string(),
        })
        .await;

    // External collaborators
    let upstream: Option<Arc<dyn RequestService>> = match &config.upstream {
        Some(upstream_config) => {
            info!("Using request service at {}", upstream_config.url);
            Some(Arc::new(
                OverseerrClient::new(upstream_config)
                    .context("Failed to create request service client")?,
            ))
        }
        None => {
            info!("No request service configured");
            None
        }
    };

    let metadata: Option<Arc<dyn MetadataProvider>> = match &config.metadata {
        Some(metadata_config) => {
            info!("Using Trakt at {}", metadata_config.base_url);
            Some(Arc::new(
                TraktClient::new(metadata_config).context("Failed to create Trakt client")?,
            ))
        }
        None => {
            info!("No metadata provider configured, subscriptions disabled");
            None
        }
    };

    let backend: Option<Arc<dyn FetchBackend>> = match &config.backend {
        Some(backend_config) => {
            info!("Using fetch backend at {}", backend_config.url);
            Some(Arc::new(
                HttpFetchBackend::new(backend_config).context("Failed to create fetch backend")?,
            ))
        }
        None => {
            warn!("No fetch backend configured, requests will be tracked but not dispatched");
            None
        }
    };

    // Side-effect dispatcher
    let dispatch_buffer = config
        .backend
        .as_ref()
        .map(|b| b.dispatch_buffer)
        .unwrap_or(DEFAULT_DISPATCH_BUFFER);
    let (effects, dispatcher) =
        create_side_effect_system(backend.clone(), upstream.clone(), dispatch_buffer);
    let dispatcher_handle = tokio::spawn(dispatcher.run());

    // Gateway
    let queue = Arc::new(DispatchQueue::from_config(&config.queue));
    let mut gateway = ReconciliationGateway::new(
        media_store,
        queue,
        RetryPolicy::from_config(&config.retry),
        effects,
    )
    .with_audit(audit_handle.clone());
    if let Some(backend) = backend {
        gateway = gateway.with_backend(backend);
    }
    if let Some(upstream) = upstream {
        gateway = gateway.with_upstream(upstream);
    }
    if let Some(metadata) = metadata {
        gateway = gateway.with_metadata(metadata);
    }

    // Scheduler
    let scheduler = Arc::new(Scheduler::new(
        SchedulerConfig::from_config(&config),
        gateway.clone(),
    ));
    scheduler.start().await;

    let state = Arc::new(AppState::new(
        config.clone(),
        gateway,
        Arc::clone(&scheduler),
        audit_store,
    ));
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    scheduler.stop().await;

    audit_handle
        .emit(AuditEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        })
        .await;

    // The writer and dispatcher exit once every handle is gone. Spawned
    // correlation tasks may still hold gateway clones, so neither is awaited
    // unboundedly.
    drop(scheduler);
    drop(audit_handle);
    let drain = std::time::Duration::from_secs(5);
    if tokio::time::timeout(drain, writer_handle).await.is_err() {
        warn!("Audit writer did not drain in time");
    }
    dispatcher_handle.abort();
    info!("Shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
