//! # HTTP Server
//!
//! Serves the hello routes with CORS and request tracing, and shuts down gracefully:
//! the notifier is shut down first so parked long polls return before axum
//! waits on in-flight connections.

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::config::HttpServerConfig;
use super::hello_routes::{hello_routes, HelloState};
use crate::observability::Event;
use crate::topology::{Notifier, ReplicaSetDescription};

/// HTTP server for the topology service
pub struct HttpServer {
    config: HttpServerConfig,
    notifier: Arc<Notifier<ReplicaSetDescription>>,
    router: Router,
}

impl HttpServer {
    /// Create a server over `notifier`
    pub fn with_config(
        config: HttpServerConfig,
        notifier: Arc<Notifier<ReplicaSetDescription>>,
    ) -> Self {
        let router = Self::build_router(&config, Arc::clone(&notifier));
        Self {
            config,
            notifier,
            router,
        }
    }

    fn build_router(config: &HttpServerConfig, notifier: Arc<Notifier<ReplicaSetDescription>>) -> Router {
        let state = Arc::new(HelloState::new(notifier, config.max_await()));

        let cors = if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .merge(hello_routes(state))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn start<F>(self, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.socket_addr()).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!(
            event = %Event::Serving,
            %addr,
            process_id = %self.notifier.process_id(),
            "topology service listening"
        );

        let notifier = Arc::clone(&self.notifier);
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!(event = %Event::ShutdownStart, "shutdown requested");
                let released = notifier.shutdown();
                info!(released, "released parked requests");
            })
            .await?;

        info!(event = %Event::ShutdownComplete, "topology service stopped");
        Ok(())
    }
}
