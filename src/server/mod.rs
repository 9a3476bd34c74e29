use crate::config::Config;
use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use clipforge_av::{tools, Engine, Staging};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod deliver;
pub mod error;
pub mod routes_media;
pub mod upload;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    /// ffmpeg/ffprobe handle shared by every request
    pub engine: Engine,
    /// Upload and output directories
    pub staging: Staging,
}

impl AppContext {
    /// Build a context from configuration, resolving tool paths.
    ///
    /// Configured tool paths win; otherwise ffmpeg and ffprobe are looked up
    /// on `PATH`.
    pub fn from_config(config: Config) -> Result<Self> {
        let ffmpeg = tools::get_tool_path("ffmpeg", config.tools.ffmpeg_path.as_deref())
            .context("ffmpeg is required")?;
        let ffprobe = tools::get_tool_path("ffprobe", config.tools.ffprobe_path.as_deref())
            .context("ffprobe is required")?;

        Ok(Self::new(config, ffmpeg, ffprobe))
    }

    /// Build a context with explicit tool paths.
    pub fn new(config: Config, ffmpeg: std::path::PathBuf, ffprobe: std::path::PathBuf) -> Self {
        let engine = Engine::new(ffmpeg, ffprobe)
            .with_stage_timeout(config.engine.stage_timeout())
            .with_probe_timeout(config.engine.probe_timeout());
        let staging = Staging::new(
            config.storage.upload_dir.clone(),
            config.storage.output_dir.clone(),
        );

        Self {
            config: Arc::new(config),
            engine,
            staging,
        }
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .expose_headers([header::CONTENT_DISPOSITION]);

    Router::new()
        // Health check
        .route("/health", get(health_check))
        .merge(routes_media::media_routes())
        .layer(DefaultBodyLimit::max(ctx.config.server.max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let ctx = AppContext::from_config(config)?;
    tracing::info!(
        "Using ffmpeg at {:?}, ffprobe at {:?}",
        ctx.engine.ffmpeg(),
        ctx.engine.ffprobe()
    );

    if ctx.config.storage.purge_on_start {
        let removed = ctx
            .staging
            .purge()
            .context("Failed to purge staging directories")?;
        if removed > 0 {
            tracing::info!("Removed {} leftover files from a previous run", removed);
        }
    }

    let grace = ctx.config.server.shutdown_grace();
    let cancel = ctx.engine.cancellation().clone();
    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let (signalled_tx, signalled_rx) = oneshot::channel::<()>();
    let reaper = tokio::spawn(cancel_after_grace(signalled_rx, grace, cancel));

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = signalled_tx.send(());
        })
        .await?;

    reaper.abort();
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Cancel `cancel` once `grace` has passed since `signalled` fired.
///
/// In-flight requests get `grace` to finish before their engine subprocesses
/// are killed. Returns without cancelling if the sender is dropped unsent.
async fn cancel_after_grace(
    signalled: oneshot::Receiver<()>,
    grace: Duration,
    cancel: CancellationToken,
) {
    if signalled.await.is_err() {
        return;
    }
    tokio::time::sleep(grace).await;
    tracing::warn!(
        "Requests still running after {:?}, killing engine processes",
        grace
    );
    cancel.cancel();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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

    tracing::info!("Shutdown signal received, draining in-flight requests");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn engine_cancelled_only_after_grace() {
        let token = CancellationToken::new();
        let (tx, rx) = oneshot::channel();
        let grace = Duration::from_millis(200);
        let reaper = tokio::spawn(cancel_after_grace(rx, grace, token.clone()));

        let signalled_at = Instant::now();
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), token.cancelled())
            .await
            .expect("token was never cancelled");

        assert!(signalled_at.elapsed() >= grace);
        reaper.await.unwrap();
    }

    #[tokio::test]
    async fn no_signal_means_no_cancel() {
        let token = CancellationToken::new();
        let (tx, rx) = oneshot::channel::<()>();
        let reaper = tokio::spawn(cancel_after_grace(rx, Duration::ZERO, token.clone()));

        drop(tx);
        reaper.await.unwrap();
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn drained_server_aborts_pending_cancel() {
        let token = CancellationToken::new();
        let (tx, rx) = oneshot::channel();
        let reaper = tokio::spawn(cancel_after_grace(
            rx,
            Duration::from_millis(100),
            token.clone(),
        ));

        tx.send(()).unwrap();
        reaper.abort();
        assert!(reaper.await.unwrap_err().is_cancelled());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!token.is_cancelled());
    }
}
