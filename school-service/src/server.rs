//! HTTP server with graceful shutdown

use axum::{routing::get, Router};
use http::StatusCode;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    catch_panic::CatchPanicLayer,
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

use crate::{
    config::Config,
    error::Result,
    handlers,
    health::{health, readiness},
    middleware::{
        request_id_layer, request_id_propagation_layer, sensitive_headers_layer, Pipeline,
        RateLimiter,
    },
    state::AppState,
};

/// Server instance
pub struct Server {
    config: Config,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build the full application: routes, the middleware pipeline and the
    /// tower-http layers around it
    pub fn router(&self, state: AppState, limiter: Option<RateLimiter>) -> Router {
        let routes = Router::new()
            .route("/", get(handlers::root))
            .route("/health", get(health))
            .route("/ready", get(readiness))
            .merge(handlers::routes());

        let field_names: Vec<&'static str> = state.registry().names().collect();
        let pipeline = Pipeline::from_config(&self.config, limiter, field_names);
        tracing::info!(stages = ?pipeline.names(), "Middleware pipeline");

        let body_limit = self.config.middleware.body_limit_mb * 1024 * 1024;

        pipeline
            .wrap(routes.with_state(state))
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                self.config.service.timeout(),
            ))
            .layer(RequestBodyLimitLayer::new(body_limit))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().include_headers(true))
                    .on_response(DefaultOnResponse::new().include_headers(true)),
            )
            .layer(sensitive_headers_layer())
            .layer(request_id_propagation_layer())
            .layer(request_id_layer())
            .layer(CatchPanicLayer::new())
    }

    /// Run the server until SIGINT or SIGTERM
    pub async fn serve(self, state: AppState) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.service.port));

        tracing::info!("Starting {} on {}", self.config.service.name, addr);
        self.log_middleware_config();

        let limiter = self
            .config
            .rate_limit
            .enabled
            .then(|| RateLimiter::from_config(&self.config.rate_limit));
        if let Some(limiter) = limiter.clone() {
            tokio::spawn(purge_rate_limit_windows(limiter));
        }

        let app = self.router(state, limiter);

        let listener = TcpListener::bind(&addr).await?;

        tracing::info!("Server listening on {}", addr);

        // ConnectInfo gives the rate limiter the peer address
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        tracing::info!("Server shutdown complete");

        Ok(())
    }

    fn log_middleware_config(&self) {
        let middleware = &self.config.middleware;
        tracing::info!("Middleware configuration:");
        tracing::info!("  - Panic recovery: enabled");
        tracing::info!("  - Request ID tracking: enabled");
        tracing::info!("  - Request body limit: {} MB", middleware.body_limit_mb);
        tracing::info!(
            "  - Request timeout: {} seconds",
            self.config.service.timeout_secs
        );
        if self.config.rate_limit.enabled {
            tracing::info!(
                "  - Rate limiting: {} req / {} sec per caller",
                self.config.rate_limit.max_requests,
                self.config.rate_limit.window_secs
            );
        } else {
            tracing::info!("  - Rate limiting: disabled");
        }
        tracing::info!(
            "  - Parameter pollution filter: {} ({:?})",
            middleware.parameter_pollution.enabled,
            middleware.parameter_pollution.action
        );
        tracing::info!("  - Compression: {}", middleware.compression);
    }
}

/// Drop expired rate-limit windows once per window period
async fn purge_rate_limit_windows(limiter: RateLimiter) {
    let period = limiter.window().max(Duration::from_secs(1));
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let purged = limiter.purge_expired();
        if purged > 0 {
            tracing::debug!(purged, "Purged expired rate-limit windows");
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl+C), starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    tracing::info!("Shutdown signal received, draining requests...");
}
