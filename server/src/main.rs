use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use docinspect::config::load_from_env;
use docinspect::intake::SessionIntake;
use docinspect::pipeline::{Pipeline, PipelineConfig};
use docinspect::worker::WorkerPool;
use docinspect::{Database, Services};
use docinspect_server::config::ServerConfig;
use docinspect_server::state::AppState;
use docinspect_server::{routes, telemetry};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = Arc::new(load_from_env()?);
    telemetry::init(&config.logging)?;
    let server_config = ServerConfig::from_config(&config);
    tracing::info!(
        host = %server_config.host,
        port = server_config.port,
        workers = config.worker_count,
        stub_adapters = config.use_stub_adapters,
        "Loaded configuration"
    );

    // --- Database ---
    let db = Database::open(std::path::Path::new(&config.database_path))?;

    // --- Adapters and pipeline ---
    let services = Services::new(Arc::clone(&config));
    let adapters = services.adapters().await?;
    let pipeline = Arc::new(Pipeline::new(
        Arc::new(PipelineConfig::from_config(&config)),
        db.clone(),
        adapters,
        tokio::runtime::Handle::current(),
    ));

    // --- Worker pool ---
    let pool = Arc::new(WorkerPool::new(Arc::clone(&pipeline), config.worker_count)?);
    let results = pool.results();
    let drain = std::thread::Builder::new()
        .name("inspect-results".to_string())
        .spawn(move || {
            for result in results.iter() {
                if result.success {
                    tracing::debug!(document_id = result.document_id, "Job finished");
                } else {
                    tracing::warn!(
                        document_id = result.document_id,
                        session_id = result.session_id,
                        error = result.error.as_deref().unwrap_or("unknown"),
                        "Job failed"
                    );
                }
            }
        })?;

    // --- App state ---
    let state = AppState {
        db: db.clone(),
        intake: Arc::new(
            SessionIntake::new(db, config.work_root.clone())
                .with_max_extracted_bytes(server_config.max_upload_bytes as u64),
        ),
        jobs: pool.clone(),
        pipeline,
        config: Arc::new(server_config.clone()),
    };

    let app = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(DefaultBodyLimit::max(server_config.max_upload_bytes))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(build_cors_layer(&server_config))
        .with_state(state);

    // --- Start server ---
    let addr = SocketAddr::new(server_config.host.parse()?, server_config.port);
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- Post-shutdown cleanup ---
    tracing::info!(stats = ?pool.stats(), "Server stopped, draining worker pool");
    pool.shutdown();
    match Arc::try_unwrap(pool) {
        Ok(pool) => {
            tokio::task::spawn_blocking(move || pool.wait()).await?;
        }
        Err(_) => tracing::warn!("Worker pool still referenced, not waiting for workers"),
    }
    if drain.join().is_err() {
        tracing::error!("Result drain thread panicked");
    }

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, starting graceful shutdown"),
        () = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}

/// Configured origins, or any origin when none are listed. Unparseable
/// origins are skipped.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    if config.cors_origins.is_empty() {
        return base.allow_origin(AllowOrigin::any());
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(origin) => Some(origin),
            Err(e) => {
                tracing::warn!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(origins))
}
