use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    routing::{get, post},
};
use tokio::{net::TcpListener, sync::broadcast};
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use zenith_common::{Signal, internal};
use zenith_delivery::Engine;

use crate::{ApiConfig, ApiError, HealthChecker, handlers, pixel};

/// Shared by every handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: Engine,
    pub health: Arc<HealthChecker>,
    /// How long a pixel load waits for its open to be recorded before the
    /// pixel is served anyway
    pub open_wait: Duration,
}

/// All routes
///
/// API and health routes run under `request_timeout`. The pixel routes are
/// added after the timeout layer so they never answer with anything but the
/// pixel; they bound their own wait with [`AppState::open_wait`].
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/api/campaigns", get(handlers::campaigns))
        .route("/api/campaigns/{id}", get(handlers::campaign))
        .route("/api/campaigns/{id}/launch", post(handlers::launch))
        .route("/api/campaigns/{id}/pause", post(handlers::pause))
        .route("/api/campaigns/{id}/resume", post(handlers::resume))
        .route("/api/deliveries/{key}", get(handlers::deliveries))
        .route("/health/live", get(handlers::liveness))
        .route("/health/ready", get(handlers::readiness))
        .layer(ServiceBuilder::new().layer(TimeoutLayer::new(request_timeout)))
        .route("/track/open/", get(pixel::keyless_pixel))
        .route("/track/open/{*key}", get(pixel::open_pixel))
        .with_state(state)
}

pub struct ApiServer {
    listener: TcpListener,
    router: Router,
}

impl ApiServer {
    /// Bind the listener
    ///
    /// # Errors
    /// If the address cannot be bound
    pub async fn new(config: &ApiConfig, state: AppState) -> Result<Self, ApiError> {
        let listener = TcpListener::bind(&config.listen_address)
            .await
            .map_err(|e| ApiError::Bind {
                address: config.listen_address.clone(),
                source: e,
            })?;

        internal!(
            level = INFO,
            address = %config.listen_address,
            "API server bound"
        );

        Ok(Self {
            listener,
            router: router(state, config.request_timeout()),
        })
    }

    /// Address actually bound, useful when binding port 0
    ///
    /// # Errors
    /// If the socket cannot report its address
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ApiError> {
        self.listener
            .local_addr()
            .map_err(|e| ApiError::Server(e.to_string()))
    }

    /// Serve until a shutdown signal arrives
    ///
    /// # Errors
    /// If the server fails while running
    pub async fn serve(self, mut shutdown: broadcast::Receiver<Signal>) -> Result<(), ApiError> {
        internal!(level = INFO, "API server starting");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                internal!(level = INFO, "API server received shutdown signal");
            })
            .await
            .map_err(|e| ApiError::Server(e.to_string()))?;

        internal!(level = INFO, "API server stopped");
        Ok(())
    }
}
