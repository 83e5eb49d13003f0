//! HTTP server with graceful shutdown

use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

use crate::{
    config::Config,
    error::Result,
    middleware::{request_id_layer, request_id_propagation_layer, sensitive_headers_layer},
};

/// Server instance
#[derive(Debug)]
pub struct Server {
    config: Config,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the server with the given router until SIGINT or SIGTERM
    pub async fn serve(self, app: Router) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.service.port));

        tracing::info!("Starting {} on {}", self.config.service.name, addr);
        self.log_middleware_config();

        let app = self.apply_middleware(app);
        let listener = TcpListener::bind(&addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");

        Ok(())
    }

    /// Wrap `app` in the configured middleware stack
    ///
    /// Layers are listed outermost first; the last one added runs closest to
    /// the handlers.
    pub fn apply_middleware(&self, app: Router) -> Router {
        let middleware = &self.config.middleware;
        let tracking = &middleware.request_tracking;
        let body_limit = middleware.body_limit_mb * 1024 * 1024;

        let mut app = app.layer(self.build_cors_layer());

        if middleware.compression {
            app = app.layer(CompressionLayer::new());
        }

        app = app
            .layer(TimeoutLayer::with_status_code(
                http::StatusCode::REQUEST_TIMEOUT,
                self.config.service.timeout(),
            ))
            .layer(RequestBodyLimitLayer::new(body_limit))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().include_headers(true))
                    .on_response(DefaultOnResponse::new().include_headers(true)),
            );

        if tracking.mask_sensitive_headers {
            app = app.layer(sensitive_headers_layer());
        }
        if tracking.propagate_headers {
            app = app.layer(request_id_propagation_layer(tracking));
        }
        if tracking.request_id_enabled {
            app = app.layer(request_id_layer(tracking));
        }
        if middleware.catch_panic {
            app = app.layer(CatchPanicLayer::new());
        }

        app
    }

    fn log_middleware_config(&self) {
        let middleware = &self.config.middleware;
        tracing::info!(
            body_limit_mb = middleware.body_limit_mb,
            compression = middleware.compression,
            catch_panic = middleware.catch_panic,
            cors_mode = %middleware.cors_mode,
            request_id = middleware.request_tracking.request_id_enabled,
            request_id_header = %middleware.request_tracking.request_id_header,
            timeout_secs = self.config.service.timeout_secs,
            "Middleware configuration"
        );
        tracing::info!(
            base_url = %self.config.jsonapi.base_url,
            default_page_size = self.config.jsonapi.default_page_size,
            max_page_size = ?self.config.jsonapi.max_page_size,
            max_include_depth = self.config.jsonapi.max_include_depth,
            "JSON:API configuration"
        );
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn build_cors_layer(&self) -> CorsLayer {
        match self.config.middleware.cors_mode.as_str() {
            "permissive" => {
                tracing::debug!("Enabling permissive CORS");
                CorsLayer::permissive()
            }
            "restrictive" => {
                tracing::debug!("Enabling restrictive CORS (default deny)");
                CorsLayer::new()
            }
            "disabled" => {
                tracing::debug!("CORS disabled (using restrictive)");
                CorsLayer::new()
            }
            _ => {
                tracing::warn!(
                    "Unknown CORS mode: {}, defaulting to permissive",
                    self.config.middleware.cors_mode
                );
                CorsLayer::permissive()
            }
        }
    }
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
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
}
