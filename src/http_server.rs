//! Notification endpoint
//!
//! Accepts broker notifications over HTTP and forwards them to the
//! orchestrator.

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::Result;
use crate::ingest::{Acknowledgement, Notification, Orchestrator};

pub struct NotificationServer {
    orchestrator: Arc<Orchestrator>,
}

impl NotificationServer {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", post(handle_notification))
            .route("/notify", post(handle_notification))
            .route("/health", get(handle_health))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.orchestrator.clone())
    }

    /// Serve until a shutdown signal arrives or `cancel` fires.
    ///
    /// A shutdown signal cancels `cancel` so that background tasks stop too.
    pub async fn serve(&self, addr: SocketAddr, cancel: CancellationToken) -> Result<()> {
        info!("Starting notification endpoint on {}", addr);

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = shutdown_signal() => cancel.cancel(),
                    _ = cancel.cancelled() => {}
                }
            })
            .await?;

        info!("Notification endpoint stopped");
        Ok(())
    }
}

async fn handle_notification(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(notification): Json<Notification>,
) -> Json<Acknowledgement> {
    info!(
        subscription = %notification.subscription_id,
        readings = notification.data.len(),
        "notification received"
    );
    Json(orchestrator.process_notification(notification).await)
}

async fn handle_health(State(orchestrator): State<Arc<Orchestrator>>) -> Json<Value> {
    Json(json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION"),
        "entities": orchestrator.entity_count().await,
    }))
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
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

    info!("Shutdown signal received, starting graceful shutdown");
}
